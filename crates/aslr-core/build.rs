//! Build script for aslr-core
//!
//! Checks system requirements before compilation:
//! - Minimum Rust version (1.85, the first with edition 2024)
//! - On macOS hosts, a macOS release with `mach_vm_region_recurse` and
//!   `mach_vm_read_overwrite` available to 64-bit tasks (10.9+)

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    match (rustc_version::version(), rustc_version::Version::parse("1.85.0")) {
        (Ok(found), Ok(minimum)) if found < minimum => {
            panic!("aslr-core requires Rust {minimum} or newer, found {found}");
        }
        (Ok(_), Ok(_)) => {}
        _ => println!("cargo:warning=could not verify Rust version"),
    }

    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("macos") {
        println!("cargo:warning=aslr-core has no native introspection backend for this target; lookups will fail");
    }

    #[cfg(target_os = "macos")]
    check_macos_requirements();
}

#[cfg(target_os = "macos")]
fn check_macos_requirements()
{
    let minimum = (10, 9, 0);

    match get_macos_version() {
        Some(version) if version < minimum => panic!(
            "aslr-core requires macOS {}.{}.{} or newer, found {}.{}.{}",
            minimum.0, minimum.1, minimum.2, version.0, version.1, version.2
        ),
        Some(_) => {}
        // Might be cross-compiling
        None => println!("cargo:warning=could not detect macOS version"),
    }
}

#[cfg(target_os = "macos")]
fn get_macos_version() -> Option<(u32, u32, u32)>
{
    use std::process::Command;

    let output = Command::new("sw_vers").arg("-productVersion").output().ok()?;
    let version_str = String::from_utf8(output.stdout).ok()?;

    // e.g. "14.2.1" or "11.0"
    let mut parts = version_str.trim().split('.').map(|part| part.parse::<u32>().ok());
    let major = parts.next()??;
    let minor = parts.next()??;
    let patch = parts.next().flatten().unwrap_or(0);

    Some((major, minor, patch))
}
