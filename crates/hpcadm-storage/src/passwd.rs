//! Local passwd database lookups.
//!
//! The cleanup and ownership checks consult `/etc/passwd` (or NSS) for a
//! user's shell and for mapping a uid back to a name. A trait keeps the
//! lookups stubbable in tests.

use crate::Result;
use hpcadm_core::Error;
use std::ffi::{CStr, CString};

/// Read-only passwd lookups.
pub trait PasswdLookup: Send + Sync {
    /// Login shell of the named user, or `None` when unknown.
    fn shell(&self, username: &str) -> Result<Option<String>>;

    /// User name owning the given uid, or `None` when unknown.
    fn name_for_uid(&self, uid: u32) -> Result<Option<String>>;
}

/// Lookups against the real system passwd database.
#[derive(Debug, Clone, Default)]
pub struct SystemPasswd;

impl PasswdLookup for SystemPasswd {
    fn shell(&self, username: &str) -> Result<Option<String>> {
        let name = CString::new(username)
            .map_err(|_| Error::InvalidRequest(format!("invalid user name: {username:?}")))?;

        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut buf = vec![0_u8; passwd_buffer_size()];
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        let rc = unsafe {
            libc::getpwnam_r(
                name.as_ptr(),
                &mut pwd,
                buf.as_mut_ptr().cast::<libc::c_char>(),
                buf.len(),
                &mut result,
            )
        };
        if rc != 0 {
            return Err(Error::InternalError(format!(
                "getpwnam_r({username}) failed with errno {rc}"
            )));
        }
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(unsafe { cstr_field(pwd.pw_shell) }))
    }

    fn name_for_uid(&self, uid: u32) -> Result<Option<String>> {
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut buf = vec![0_u8; passwd_buffer_size()];
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        let rc = unsafe {
            libc::getpwuid_r(
                uid,
                &mut pwd,
                buf.as_mut_ptr().cast::<libc::c_char>(),
                buf.len(),
                &mut result,
            )
        };
        if rc != 0 {
            return Err(Error::InternalError(format!(
                "getpwuid_r({uid}) failed with errno {rc}"
            )));
        }
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(unsafe { cstr_field(pwd.pw_name) }))
    }
}

fn passwd_buffer_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_GETPW_R_SIZE_MAX) };
    usize::try_from(size).unwrap_or(16_384)
}

/// Caller must pass a pointer from a successfully filled passwd record.
unsafe fn cstr_field(ptr: *const libc::c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}
