//! End-to-end tests of the driver with fake collaborators

use std::cell::Cell;
use std::io;
use std::sync::{Arc, Mutex};

use aslr_core::{Address, AslrError, ImageLocator, ProcessId, ProcessSelector, Result, Slide, SlideCalculator};
use aslr_utils::{console_subscriber, LoggingConfig};
use get_aslr::{Driver, EXIT_FAILURE, EXIT_SUCCESS, ROOT_ADVISORY, USAGE};

/// Locator that records the PID it was asked about
struct FakeLocator
{
    address: Option<u64>,
    asked: Cell<Option<ProcessId>>,
}

impl FakeLocator
{
    fn found(address: u64) -> Self
    {
        Self {
            address: Some(address),
            asked: Cell::new(None),
        }
    }

    fn missing() -> Self
    {
        Self {
            address: None,
            asked: Cell::new(None),
        }
    }
}

impl ImageLocator for FakeLocator
{
    fn find_main_binary(&self, pid: ProcessId) -> Result<Address>
    {
        self.asked.set(Some(pid));
        self.address.map(Address::new).ok_or(AslrError::ImageNotFound(pid.0))
    }
}

/// Calculator that counts its calls
struct FakeCalculator
{
    slide: Option<u64>,
    calls: Cell<usize>,
}

impl FakeCalculator
{
    fn slide(slide: u64) -> Self
    {
        Self {
            slide: Some(slide),
            calls: Cell::new(0),
        }
    }

    fn failing() -> Self
    {
        Self {
            slide: None,
            calls: Cell::new(0),
        }
    }
}

impl SlideCalculator for FakeCalculator
{
    fn compute_slide(&self, _image: Address, _pid: ProcessId) -> Result<Slide>
    {
        self.calls.set(self.calls.get() + 1);
        self.slide
            .map(Slide::new)
            .ok_or_else(|| AslrError::InvalidImage("missing __TEXT segment".to_string()))
    }
}

fn numeric_only(selector: &ProcessSelector) -> Result<ProcessId>
{
    match selector {
        ProcessSelector::Pid(pid) => Ok(*pid),
        ProcessSelector::Current => Ok(ProcessId::current()),
        ProcessSelector::Name(name) => Err(AslrError::NoSuchProcessName(name.clone())),
    }
}

struct Captured
{
    code: u8,
    stdout: String,
    stderr: String,
}

fn invoke(args: &[&str], locator: &FakeLocator, calculator: &FakeCalculator, elevated: bool) -> Captured
{
    let driver = Driver::new(locator, calculator, numeric_only).elevated(elevated);
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let code = driver.run(args.iter().copied(), &mut stdout, &mut stderr);
    Captured {
        code,
        stdout: String::from_utf8(stdout).unwrap(),
        stderr: String::from_utf8(stderr).unwrap(),
    }
}

#[test]
fn test_no_arguments_prints_usage()
{
    let locator = FakeLocator::found(0x1_0000_0000);
    let calculator = FakeCalculator::slide(0);
    let out = invoke(&["get_aslr"], &locator, &calculator, true);

    assert_eq!(out.code, EXIT_FAILURE);
    assert!(out.stderr.contains(USAGE));
    assert!(out.stdout.is_empty());
    assert!(locator.asked.get().is_none());
}

#[test]
fn test_two_arguments_prints_usage()
{
    let locator = FakeLocator::found(0x1_0000_0000);
    let calculator = FakeCalculator::slide(0);
    let out = invoke(&["get_aslr", "1", "2"], &locator, &calculator, true);

    assert_eq!(out.code, EXIT_FAILURE);
    assert!(out.stderr.contains(USAGE));
    assert!(out.stdout.is_empty());
    assert_eq!(calculator.calls.get(), 0);
}

#[test]
fn test_image_lookup_failure()
{
    let locator = FakeLocator::missing();
    let calculator = FakeCalculator::slide(0x4000);
    let out = invoke(&["get_aslr", "321"], &locator, &calculator, true);

    assert_eq!(out.code, EXIT_FAILURE);
    assert!(out.stderr.starts_with("Failed to find address of header: "));
    assert!(out.stdout.is_empty());
    assert_eq!(calculator.calls.get(), 0);
}

#[test]
fn test_slide_computation_failure()
{
    let locator = FakeLocator::found(0x1_0000_4000);
    let calculator = FakeCalculator::failing();
    let out = invoke(&["get_aslr", "321"], &locator, &calculator, true);

    assert_eq!(out.code, EXIT_FAILURE);
    assert!(out.stderr.starts_with("Failed to find ASLR slide: "));
    assert!(out.stderr.contains("__TEXT"));
    assert!(out.stdout.is_empty());
    assert_eq!(calculator.calls.get(), 1);
}

#[test]
fn test_success_prints_hex_slide()
{
    let locator = FakeLocator::found(0x2_0000_0000);
    let calculator = FakeCalculator::slide(0x1_0000_0000);
    let out = invoke(&["get_aslr", "321"], &locator, &calculator, true);

    assert_eq!(out.code, EXIT_SUCCESS);
    assert_eq!(out.stdout, "0x100000000\n");
    assert!(out.stderr.is_empty());
}

#[test]
fn test_zero_slide()
{
    let locator = FakeLocator::found(0x1_0000_0000);
    let calculator = FakeCalculator::slide(0);
    let out = invoke(&["get_aslr", "1"], &locator, &calculator, true);

    assert_eq!(out.code, EXIT_SUCCESS);
    assert_eq!(out.stdout, "0x0\n");
}

#[test]
fn test_decimal_and_hex_reach_same_pid()
{
    for arg in ["123", "0x7B", "0x7b", "0173", " 123 "] {
        let locator = FakeLocator::found(0x1000);
        let calculator = FakeCalculator::slide(0);
        let out = invoke(&["get_aslr", arg], &locator, &calculator, true);
        assert_eq!(out.code, EXIT_SUCCESS, "argument {arg:?}");
        assert_eq!(locator.asked.get(), Some(ProcessId(123)), "argument {arg:?}");
    }
}

#[test]
fn test_not_root_warns_but_continues()
{
    let locator = FakeLocator::found(0x1_0000_8000);
    let calculator = FakeCalculator::slide(0x8000);
    let out = invoke(&["get_aslr", "99"], &locator, &calculator, false);

    assert_eq!(out.code, EXIT_SUCCESS);
    assert!(out.stderr.contains(ROOT_ADVISORY));
    assert_eq!(out.stdout, "0x8000\n");
    assert_eq!(locator.asked.get(), Some(ProcessId(99)));
}

#[test]
fn test_root_gets_no_advisory()
{
    let locator = FakeLocator::found(0x1000);
    let calculator = FakeCalculator::slide(0);
    let out = invoke(&["get_aslr", "99"], &locator, &calculator, true);
    assert!(!out.stderr.contains(ROOT_ADVISORY));
}

#[test]
fn test_malformed_pid_is_not_zero()
{
    let locator = FakeLocator::found(0x1000);
    let calculator = FakeCalculator::slide(0);
    let out = invoke(&["get_aslr", "12abc"], &locator, &calculator, true);

    // Not a number, so it is looked up as a name
    assert_eq!(out.code, EXIT_FAILURE);
    assert!(out.stderr.contains(USAGE));
    assert!(out.stderr.contains("No running process named \"12abc\""));
    assert!(locator.asked.get().is_none());
}

#[test]
fn test_digit_leading_name_is_looked_up()
{
    let locator = FakeLocator::found(0x1_0000_4000);
    let calculator = FakeCalculator::slide(0x4000);
    let by_name = |selector: &ProcessSelector| match selector {
        ProcessSelector::Name(name) if name == "1Password" => Ok(ProcessId(4242)),
        other => Err(AslrError::NoSuchProcessName(other.to_string())),
    };
    let driver = Driver::new(&locator, &calculator, by_name);
    let mut stdout = Vec::new();
    let code = driver.run(["get_aslr", "1Password"], &mut stdout, &mut Vec::new());

    assert_eq!(code, EXIT_SUCCESS);
    assert_eq!(stdout, b"0x4000\n");
    assert_eq!(locator.asked.get(), Some(ProcessId(4242)));
}

#[test]
fn test_not_root_warns_before_bad_argument()
{
    let locator = FakeLocator::found(0x1000);
    let calculator = FakeCalculator::slide(0);
    let out = invoke(&["get_aslr", "-7"], &locator, &calculator, false);

    assert_eq!(out.code, EXIT_FAILURE);
    assert!(out.stderr.starts_with(ROOT_ADVISORY));
    assert!(out.stderr.contains(USAGE));
}

/// Shared stderr stand-in that both the driver and the log layer write to
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer
{
    fn contents(&self) -> String
    {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for SharedBuffer
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>
    {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()>
    {
        Ok(())
    }
}

#[test]
fn test_default_logging_adds_nothing_to_stderr()
{
    let stderr = SharedBuffer::default();
    let sink = stderr.clone();
    let subscriber = console_subscriber(&LoggingConfig::default(), move || sink.clone());

    let locator = FakeLocator::missing();
    let calculator = FakeCalculator::slide(0);
    let mut stdout = Vec::new();
    let code = tracing::subscriber::with_default(subscriber, || {
        let driver = Driver::new(&locator, &calculator, numeric_only).elevated(false);
        driver.run(["get_aslr", "1"], &mut stdout, &mut stderr.clone())
    });

    assert_eq!(code, EXIT_FAILURE);
    assert!(stdout.is_empty());
    assert_eq!(
        stderr.contents(),
        format!("{ROOT_ADVISORY}\nFailed to find address of header: No main executable image found in process 1\n")
    );
}

#[test]
fn test_out_of_range_pid()
{
    let locator = FakeLocator::found(0x1000);
    let calculator = FakeCalculator::slide(0);
    let out = invoke(&["get_aslr", "0x100000000"], &locator, &calculator, true);

    assert_eq!(out.code, EXIT_FAILURE);
    assert!(out.stderr.contains("out of range"));
}

#[test]
fn test_unknown_process_name()
{
    let locator = FakeLocator::found(0x1000);
    let calculator = FakeCalculator::slide(0);
    let out = invoke(&["get_aslr", "NoSuchApp"], &locator, &calculator, false);

    assert_eq!(out.code, EXIT_FAILURE);
    assert!(out.stderr.contains(USAGE));
    assert!(out.stderr.contains("NoSuchApp"));
    assert!(out.stdout.is_empty());
}

#[test]
fn test_dash_inspects_own_process()
{
    let locator = FakeLocator::found(0x1000);
    let calculator = FakeCalculator::slide(0);
    let out = invoke(&["get_aslr", "-"], &locator, &calculator, true);

    assert_eq!(out.code, EXIT_SUCCESS);
    assert_eq!(locator.asked.get(), Some(ProcessId::current()));
}

#[test]
fn test_version_exits_cleanly()
{
    let locator = FakeLocator::missing();
    let calculator = FakeCalculator::failing();
    let out = invoke(&["get_aslr", "--version"], &locator, &calculator, true);

    assert_eq!(out.code, EXIT_SUCCESS);
    assert!(out.stdout.contains(env!("CARGO_PKG_VERSION")));
    assert!(locator.asked.get().is_none());
}
