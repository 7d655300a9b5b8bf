//! Hooks `fopen` and `open` in this process, opens a path with each, and
//! prints what the replacements saw.
//!
//! ```text
//! fopen-trace [PATH]
//! ```
use elf_interpose::{Interposer, global, original_fn};
use libc::{FILE, c_char, c_int, mode_t};
use std::{ffi::CStr, ffi::CString, process::ExitCode};

type FopenFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut FILE;
type OpenFn = unsafe extern "C" fn(*const c_char, c_int, mode_t) -> c_int;

unsafe fn show(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return "(null)".into();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

unsafe extern "C" fn traced_fopen(path: *const c_char, mode: *const c_char) -> *mut FILE {
    println!("Called traced_fopen({}, {})", unsafe { show(path) }, unsafe {
        show(mode)
    });
    let Some(fopen) = (unsafe { original_fn!("fopen" => FopenFn) }) else {
        return std::ptr::null_mut();
    };
    let result = unsafe { fopen(path, mode) };
    println!("  result: {:p}", result);
    result
}

// `open` is variadic; `mode` is only meaningful with O_CREAT and travels in
// the same register as a fixed third argument on the supported targets.
unsafe extern "C" fn traced_open(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    let mode = if flags & libc::O_CREAT != 0 { mode } else { 0 };
    println!("Called traced_open({}, {}, {})", unsafe { show(path) }, flags, mode);
    let Some(open) = (unsafe { original_fn!("open" => OpenFn) }) else {
        return -1;
    };
    let result = unsafe { open(path, flags, mode) };
    println!("  result: {}", result);
    result
}

fn main() -> ExitCode {
    env_logger::init();
    let path = std::env::args().nth(1).unwrap_or_else(|| "/dev/null".into());
    let Ok(cpath) = CString::new(path.as_str()) else {
        eprintln!("path contains a NUL byte: {path:?}");
        return ExitCode::FAILURE;
    };

    let interposer = match global::install(Interposer::new()) {
        Ok(interposer) => interposer,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    for (name, replacement) in [
        ("fopen", traced_fopen as *const ()),
        ("open", traced_open as *const ()),
    ] {
        if let Err(err) = interposer.create(name, replacement) {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    }
    let outcome = interposer.hook_registered();
    for (record, err) in &outcome.failures {
        log::warn!("could not hook [{}]: {}", record.name(), err);
    }
    log::info!("{} symbol(s) hooked", outcome.succeeded);

    let file = unsafe { libc::fopen(cpath.as_ptr(), c"r".as_ptr()) };
    println!("Opened {path} at {file:p}");
    if !file.is_null() {
        unsafe { libc::fclose(file) };
    }

    let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDONLY) };
    println!("Opened {path} as fd {fd}");
    if fd >= 0 {
        unsafe { libc::close(fd) };
    }

    global::shutdown();
    ExitCode::SUCCESS
}
