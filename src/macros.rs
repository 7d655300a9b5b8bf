/// Gets the original implementation of a symbol as a typed function pointer.
///
/// Expands to an `Option<$ty>`. Without an interposer argument the
/// process-wide one from [`global`](crate::global) is queried.
///
/// The caller asserts that `$ty` is a function pointer type matching the
/// real signature of the symbol, so the macro must be used inside `unsafe`.
///
/// # Examples
/// ```rust,no_run
/// use core::ffi::{c_char, c_void};
/// use elf_interpose::original_fn;
///
/// type FopenFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut c_void;
///
/// unsafe extern "C" fn my_fopen(path: *const c_char, mode: *const c_char) -> *mut c_void {
///     match unsafe { original_fn!("fopen" => FopenFn) } {
///         Some(fopen) => unsafe { fopen(path, mode) },
///         None => core::ptr::null_mut(),
///     }
/// }
/// ```
#[macro_export]
macro_rules! original_fn {
    ($interposer:expr, $name:expr => $ty:ty) => {
        $interposer
            .original_pointer_by_name($name)
            .map(|ptr| $crate::macros::cast_original::<$ty>(ptr))
    };
    ($name:expr => $ty:ty) => {
        $crate::global::original_pointer_by_name($name)
            .map(|ptr| $crate::macros::cast_original::<$ty>(ptr))
    };
}

#[doc(hidden)]
#[inline(always)]
pub unsafe fn cast_original<F: Copy>(ptr: core::ptr::NonNull<()>) -> F {
    debug_assert_eq!(size_of::<F>(), size_of::<*mut ()>());
    unsafe { core::mem::transmute_copy(&ptr.as_ptr()) }
}
