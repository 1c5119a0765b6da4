//! User and group lookups through the C library.

use std::ffi::{CStr, CString};
use std::mem::MaybeUninit;
use std::ptr;

const BUFFER_SIZE: usize = 16 * 1024;

/// Login name for `uid`.
pub fn user_name(uid: u32) -> Option<String> {
    let mut buf = vec![0 as libc::c_char; BUFFER_SIZE];
    let mut pwd: MaybeUninit<libc::passwd> = MaybeUninit::uninit();
    let mut found: *mut libc::passwd = ptr::null_mut();

    // SAFETY: getpwuid_r writes into the caller-owned `pwd` and `buf`; the
    // record is only read when the call succeeded and `found` is non-null,
    // and the name is copied out before `buf` goes away.
    unsafe {
        let rc = libc::getpwuid_r(uid, pwd.as_mut_ptr(), buf.as_mut_ptr(), buf.len(), &raw mut found);
        if rc != 0 || found.is_null() {
            return None;
        }
        let pwd = pwd.assume_init();
        Some(CStr::from_ptr(pwd.pw_name).to_string_lossy().into_owned())
    }
}

/// Group name for `gid`.
pub fn group_name(gid: u32) -> Option<String> {
    let mut buf = vec![0 as libc::c_char; BUFFER_SIZE];
    let mut grp: MaybeUninit<libc::group> = MaybeUninit::uninit();
    let mut found: *mut libc::group = ptr::null_mut();

    // SAFETY: as in `user_name`, for getgrgid_r.
    unsafe {
        let rc = libc::getgrgid_r(gid, grp.as_mut_ptr(), buf.as_mut_ptr(), buf.len(), &raw mut found);
        if rc != 0 || found.is_null() {
            return None;
        }
        let grp = grp.assume_init();
        Some(CStr::from_ptr(grp.gr_name).to_string_lossy().into_owned())
    }
}

/// Uid for a login name or a numeric id.
pub fn user_id(name: &str) -> Option<u32> {
    if let Ok(uid) = name.parse() {
        return Some(uid);
    }
    let c_name = CString::new(name).ok()?;
    let mut buf = vec![0 as libc::c_char; BUFFER_SIZE];
    let mut pwd: MaybeUninit<libc::passwd> = MaybeUninit::uninit();
    let mut found: *mut libc::passwd = ptr::null_mut();

    // SAFETY: as in `user_name`, for getpwnam_r with a NUL-terminated name.
    unsafe {
        let rc = libc::getpwnam_r(
            c_name.as_ptr(),
            pwd.as_mut_ptr(),
            buf.as_mut_ptr(),
            buf.len(),
            &raw mut found,
        );
        if rc != 0 || found.is_null() {
            return None;
        }
        Some(pwd.assume_init().pw_uid)
    }
}

/// Gid for a group name or a numeric id.
pub fn group_id(name: &str) -> Option<u32> {
    if let Ok(gid) = name.parse() {
        return Some(gid);
    }
    let c_name = CString::new(name).ok()?;
    let mut buf = vec![0 as libc::c_char; BUFFER_SIZE];
    let mut grp: MaybeUninit<libc::group> = MaybeUninit::uninit();
    let mut found: *mut libc::group = ptr::null_mut();

    // SAFETY: as in `user_name`, for getgrnam_r with a NUL-terminated name.
    unsafe {
        let rc = libc::getgrnam_r(
            c_name.as_ptr(),
            grp.as_mut_ptr(),
            buf.as_mut_ptr(),
            buf.len(),
            &raw mut found,
        );
        if rc != 0 || found.is_null() {
            return None;
        }
        Some(grp.assume_init().gr_gid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_round_trip() {
        let name = user_name(0).unwrap();
        assert_eq!(user_id(&name), Some(0));
        assert!(group_name(0).is_some());
    }

    #[test]
    fn test_numeric_ids_pass_through() {
        assert_eq!(user_id("4242"), Some(4242));
        assert_eq!(group_id("4242"), Some(4242));
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!(user_id("no-such-user-rigger"), None);
        assert_eq!(group_id("no-such-group-rigger"), None);
    }
}
