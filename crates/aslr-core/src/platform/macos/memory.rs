//! # macOS Memory Operations
//!
//! Address-space walking and memory access over a task port.
//!
//! - **mach_vm_region_recurse()**: enumerate mapped regions, descending into submaps
//! - **mach_vm_read_overwrite()**: copy bytes from the target into our buffer
//! - **mach_vm_write()**: copy bytes from our buffer into the target
//! - **mach_vm_protect()**: change the current protection of a range
//!
//! ## References
//!
//! - [mach_vm_region_recurse](https://developer.apple.com/documentation/kernel/1402375-mach_vm_region_recurse)
//! - [mach_vm_read_overwrite](https://developer.apple.com/documentation/kernel/1402127-mach_vm_read_overwrite)
//! - [mach_vm_protect](https://developer.apple.com/documentation/kernel/1402149-mach_vm_protect/)

use std::cmp::min;

use mach2::kern_return::{KERN_INVALID_ADDRESS, KERN_SUCCESS};
use mach2::message::mach_msg_type_number_t;
use mach2::vm::{mach_vm_protect, mach_vm_read_overwrite, mach_vm_region_recurse, mach_vm_write};
use mach2::vm_prot::VM_PROT_READ;
use mach2::vm_region::{
    vm_region_recurse_info_t, vm_region_submap_short_info_data_64_t, VM_REGION_SUBMAP_SHORT_INFO_COUNT_64,
};
use mach2::vm_types::{mach_vm_address_t, mach_vm_size_t, natural_t, vm_offset_t};
use once_cell::sync::Lazy;
use tracing::{debug, trace};

use crate::error::{AslrError, Result};
use crate::memory::{AddressRange, ProcessMemory, Protection};
use crate::platform::macos::error::MachError;
use crate::platform::macos::task::TaskPort;
use crate::types::{Address, ProcessId};

/// Largest single `mach_vm_read_overwrite()` request.
const MAX_VM_READ_CHUNK: usize = 1 << 20;

#[allow(unsafe_code)] // sysconf() has no preconditions
static SYSTEM_PAGE_SIZE: Lazy<u64> = Lazy::new(|| {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    u64::try_from(size).ok().filter(|&size| size > 0).unwrap_or(0x4000)
});

/// Page size of the calling process
pub fn page_size() -> u64
{
    *SYSTEM_PAGE_SIZE
}

/// One mapped region of a task's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region
{
    /// First address of the region
    pub start: Address,
    /// One past the last address of the region
    pub end: Address,
    /// Current `VM_PROT_*` bits
    pub protection: i32,
    /// `VM_MEMORY_*` tag set by the allocator, 0 for file mappings
    pub user_tag: u32,
}

impl Region
{
    /// Size in bytes
    pub fn size(&self) -> u64
    {
        self.end.value().saturating_sub(self.start.value())
    }

    /// Whether the region can be read
    pub fn is_readable(&self) -> bool
    {
        self.protection & VM_PROT_READ != 0
    }

    /// Protection as an `rwx` string
    pub fn permissions(&self) -> String
    {
        Protection::from_bits(self.protection).to_string()
    }
}

/// List every mapped region of `task`, in ascending address order.
///
/// Submaps (such as the dyld shared cache) are descended into, so the result
/// holds leaf mappings only.
///
/// ## Errors
///
/// Returns `MachError` if the kernel rejects the walk for any reason other
/// than reaching the end of the address space.
#[allow(unsafe_code)] // mach_vm_region_recurse() writes into the locals we pass
pub fn regions(task: &TaskPort) -> Result<Vec<Region>>
{
    let mut regions = Vec::new();
    let mut address: mach_vm_address_t = 0;
    let mut depth: natural_t = 0;

    loop {
        let mut size: mach_vm_size_t = 0;
        let mut info = vm_region_submap_short_info_data_64_t::default();
        let mut info_count = VM_REGION_SUBMAP_SHORT_INFO_COUNT_64;

        let result = unsafe {
            mach_vm_region_recurse(
                task.raw(),
                &mut address,
                &mut size,
                &mut depth,
                &mut info as *mut _ as vm_region_recurse_info_t,
                &mut info_count,
            )
        };

        if result == KERN_INVALID_ADDRESS {
            break;
        }
        if result != KERN_SUCCESS {
            return Err(AslrError::MachError(MachError::from(result)));
        }

        if info.is_submap != 0 {
            depth += 1;
            continue;
        }

        regions.push(Region {
            start: Address::new(address),
            end: Address::new(address.saturating_add(size)),
            protection: info.protection,
            user_tag: info.user_tag,
        });

        match address.checked_add(size) {
            Some(next) => address = next,
            None => break,
        }
    }

    trace!(pid = %task.pid(), count = regions.len(), "walked address space");
    Ok(regions)
}

/// Read `len` bytes at `addr` from `task`.
///
/// Reads are issued in chunks of at most 1 MiB. A short read ends the copy
/// early; the returned buffer then holds only what was read.
///
/// ## Errors
///
/// Returns `MachError` if the first byte cannot be read.
#[allow(unsafe_code)] // mach_vm_read_overwrite() writes at most chunk_len bytes into dst
pub fn read_memory(task: &TaskPort, addr: Address, len: usize) -> Result<Vec<u8>>
{
    let mut buffer = vec![0u8; len];
    let mut total = 0usize;

    while total < len {
        let chunk_len = min(MAX_VM_READ_CHUNK, len - total);
        let Some(cursor) = addr.checked_add(total as u64) else {
            break;
        };
        let mut actual: mach_vm_size_t = 0;

        let result = unsafe {
            mach_vm_read_overwrite(
                task.raw(),
                cursor.value(),
                chunk_len as mach_vm_size_t,
                buffer[total..].as_mut_ptr() as mach_vm_address_t,
                &mut actual,
            )
        };

        if result != KERN_SUCCESS {
            if total == 0 {
                return Err(AslrError::MachError(MachError::from(result)));
            }
            break;
        }
        if actual == 0 {
            break;
        }
        total += min(actual as usize, chunk_len);
    }

    buffer.truncate(total);
    Ok(buffer)
}

/// Read exactly `len` bytes, failing on a short read.
///
/// ## Errors
///
/// Returns `MachError` for unreadable memory and `InvalidImage` for a short read.
pub fn read_exact(task: &TaskPort, addr: Address, len: usize) -> Result<Vec<u8>>
{
    let bytes = read_memory(task, addr, len)?;
    if bytes.len() < len {
        return Err(AslrError::InvalidImage(format!(
            "short read at {addr}: wanted {len} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Write `bytes` at `addr` in `task`.
///
/// The destination must already be writable; see [`protect`].
///
/// ## Errors
///
/// Returns `MachError` if the kernel rejects the write, and `InvalidArgument`
/// if `bytes` is larger than a single Mach message can carry.
#[allow(unsafe_code)] // mach_vm_write() only reads bytes.len() bytes from the pointer
pub fn write_memory(task: &TaskPort, addr: Address, bytes: &[u8]) -> Result<()>
{
    if bytes.is_empty() {
        return Ok(());
    }
    let count = mach_msg_type_number_t::try_from(bytes.len())
        .map_err(|_| AslrError::InvalidArgument(format!("write of {} bytes is too large", bytes.len())))?;

    let result = unsafe { mach_vm_write(task.raw(), addr.value(), bytes.as_ptr() as vm_offset_t, count) };
    MachError::check(result)?;

    trace!(pid = %task.pid(), %addr, len = bytes.len(), "wrote memory");
    Ok(())
}

/// Set the current protection of `range` in `task`.
///
/// Only the current protection changes. The kernel refuses anything above the
/// region's maximum protection, which code pages of signed binaries often cap
/// at `r-x`.
///
/// ## Errors
///
/// Returns `MachError` (usually `KERN_PROTECTION_FAILURE`) when refused.
#[allow(unsafe_code)] // mach_vm_protect() takes no pointers
pub fn protect(task: &TaskPort, range: AddressRange, protection: Protection) -> Result<()>
{
    let result = unsafe { mach_vm_protect(task.raw(), range.start.value(), range.size, 0, protection.bits()) };
    MachError::check(result)?;

    debug!(pid = %task.pid(), %range, %protection, "changed protection");
    Ok(())
}

/// Memory of another process, accessed through its task port
///
/// ```rust,no_run
/// use aslr_core::memory::{patch_hex, parse_hex_address};
/// use aslr_core::platform::macos::memory::TaskMemory;
/// use aslr_core::ProcessId;
///
/// let memory = TaskMemory::attach(ProcessId(501))?;
/// let address = parse_hex_address("0x100003f10")?;
/// patch_hex(&memory, address, "0x7405", "0xEB05")?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct TaskMemory
{
    task: TaskPort,
}

impl TaskMemory
{
    /// Acquire the task port of `pid`.
    ///
    /// ## Errors
    ///
    /// Fails like [`TaskPort::for_pid`].
    pub fn attach(pid: ProcessId) -> Result<Self>
    {
        Ok(Self::from_task(TaskPort::for_pid(pid)?))
    }

    /// Wrap a task port that is already held
    pub fn from_task(task: TaskPort) -> Self
    {
        Self { task }
    }

    /// The underlying task port
    pub fn task(&self) -> &TaskPort
    {
        &self.task
    }
}

impl ProcessMemory for TaskMemory
{
    fn read(&self, range: AddressRange) -> Result<Vec<u8>>
    {
        read_exact(&self.task, range.start, range.len()?)
    }

    fn write(&self, address: Address, bytes: &[u8]) -> Result<()>
    {
        write_memory(&self.task, address, bytes)
    }

    fn protect(&self, range: AddressRange, protection: Protection) -> Result<()>
    {
        protect(&self.task, range, protection)
    }
}
