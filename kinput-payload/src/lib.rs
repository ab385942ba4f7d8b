//! Companion library loaded into the target process.
//!
//! Every export takes a single pointer to data the controller copied into
//! this process and returns nonzero for success.

#![allow(non_snake_case)]

/// Header of a `KInput_Checksum` request; `len` u32 values follow it.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ChecksumRequest {
    pub expected: u32,
    pub len: u32,
}

/// Report the status word at `status`: 1 when it is nonzero.
///
/// # Safety
/// `status` must be null or point to a readable u32.
#[no_mangle]
pub unsafe extern "system" fn KInput_Ping(status: *const u32) -> u32 {
    if status.is_null() {
        return 0;
    }
    u32::from(status.read_unaligned() != 0)
}

/// 1 if the wrapping sum of the request's values equals `expected`.
///
/// # Safety
/// `request` must be null or point to a `ChecksumRequest` followed by `len`
/// readable u32 values.
#[no_mangle]
pub unsafe extern "system" fn KInput_Checksum(request: *const ChecksumRequest) -> u32 {
    if request.is_null() {
        return 0;
    }

    let header = request.read_unaligned();
    let values = request.add(1) as *const u32;

    let sum = (0..header.len as usize)
        .map(|i| values.add(i).read_unaligned())
        .fold(0u32, u32::wrapping_add);

    u32::from(sum == header.expected)
}

#[cfg(windows)]
mod entry {
    use windows::Win32::Foundation::{BOOL, HINSTANCE, HMODULE};
    use windows::Win32::System::LibraryLoader::DisableThreadLibraryCalls;
    use windows::Win32::System::SystemServices::DLL_PROCESS_ATTACH;

    #[no_mangle]
    pub extern "system" fn DllMain(
        dll_module: HINSTANCE,
        call_reason: u32,
        _reserved: *mut std::ffi::c_void,
    ) -> BOOL {
        if call_reason == DLL_PROCESS_ATTACH {
            // Thread attach/detach notifications are not needed
            unsafe {
                let _ = DisableThreadLibraryCalls(HMODULE(dll_module.0));
            }
        }

        BOOL::from(true)
    }
}
