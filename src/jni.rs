//! JNI invocation API binding used to host a JVM in-process.
//!
//! Only the handful of functions the launcher needs are bound. JNI exposes them
//! through function tables, so each one is fetched by its fixed table index.

#![allow(non_camel_case_types)]

use crate::assembler::EntryPoint;
use crate::error::ExitCode;
use crate::runtime::{
    NativeArgv, NativeMethod, Registration, RuntimeEnv, RuntimeInstance, RuntimeLibrary,
    RuntimeLoader,
};
use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};
use std::ffi::{CStr, CString, c_char, c_void};
use std::path::Path;
use std::ptr;

pub type jint = i32;
pub type jsize = jint;
pub type jlong = i64;
pub type jboolean = u8;
pub type jobject = *mut c_void;
pub type jclass = jobject;
pub type jstring = jobject;
pub type jobjectArray = jobject;
pub type jmethodID = *mut c_void;

#[repr(C)]
#[derive(Clone, Copy)]
pub union jvalue {
    pub z: jboolean,
    pub i: jint,
    pub j: jlong,
    pub l: jobject,
}

/// `JNIEnv*`: a pointer to the environment's function table pointer.
pub type RawEnv = *mut *const *const c_void;
/// `JavaVM*`: a pointer to the invocation function table pointer.
pub type RawVm = *mut *const *const c_void;

pub const JNI_OK: jint = 0;
pub const JNI_FALSE: jboolean = 0;
pub const JNI_TRUE: jboolean = 1;
pub const JNI_VERSION_1_8: jint = 0x0001_0008;

/// Exported creation entry point of the runtime library.
pub const CREATE_JAVA_VM: &CStr = c"JNI_CreateJavaVM";

#[repr(C)]
struct JavaVMOption {
    option_string: *mut c_char,
    extra_info: *mut c_void,
}

#[repr(C)]
struct JavaVMInitArgs {
    version: jint,
    n_options: jint,
    options: *mut JavaVMOption,
    ignore_unrecognized: jboolean,
}

#[repr(C)]
struct JNINativeMethod {
    name: *mut c_char,
    signature: *mut c_char,
    fn_ptr: *mut c_void,
}

type CreateJavaVmFn = unsafe extern "system" fn(*mut RawVm, *mut *mut c_void, *mut c_void) -> jint;

// JNINativeInterface_ slots.
const FIND_CLASS: usize = 6;
const EXCEPTION_DESCRIBE: usize = 16;
const EXCEPTION_CLEAR: usize = 17;
const DELETE_LOCAL_REF: usize = 23;
const GET_STATIC_METHOD_ID: usize = 113;
const CALL_STATIC_VOID_METHOD_A: usize = 143;
const NEW_STRING_UTF: usize = 167;
const GET_STRING_UTF_CHARS: usize = 169;
const RELEASE_STRING_UTF_CHARS: usize = 170;
const NEW_OBJECT_ARRAY: usize = 172;
const SET_OBJECT_ARRAY_ELEMENT: usize = 174;
const REGISTER_NATIVES: usize = 215;
const EXCEPTION_CHECK: usize = 228;

// JNIInvokeInterface_ slots.
const DESTROY_JAVA_VM: usize = 3;

/// Fetch slot `index` of the function table behind `raw` as a function pointer.
///
/// # Safety
///
/// `raw` must be a live `JNIEnv*`/`JavaVM*` and `F` must be the exact function
/// pointer type of that slot.
unsafe fn table_fn<F: Copy>(raw: *mut *const *const c_void, index: usize) -> F {
    // SAFETY: guaranteed by the caller.
    unsafe {
        let table = *raw;
        let slot = *table.add(index);
        std::mem::transmute_copy::<*const c_void, F>(&slot)
    }
}

/// Encode `s` in the modified UTF-8 that JNI string functions expect.
///
/// NUL becomes the two bytes `C0 80` and every character outside the BMP is
/// written as its UTF-16 surrogate pair, three bytes per surrogate. The result
/// never contains a zero byte.
pub fn to_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for ch in s.chars() {
        match ch as u32 {
            0 => out.extend_from_slice(&[0xC0, 0x80]),
            cp if cp < 0x1_0000 => {
                let mut buf = [0u8; 3];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            cp => {
                let v = cp - 0x1_0000;
                for unit in [0xD800 + (v >> 10), 0xDC00 + (v & 0x3FF)] {
                    out.extend_from_slice(&[
                        0xE0 | (unit >> 12) as u8,
                        0x80 | ((unit >> 6) & 0x3F) as u8,
                        0x80 | (unit & 0x3F) as u8,
                    ]);
                }
            }
        }
    }
    out
}

/// Thin, copyable handle to a `JNIEnv*` valid on the current thread.
#[derive(Debug, Clone, Copy)]
pub struct JniEnv {
    raw: RawEnv,
}

impl JniEnv {
    /// Wrap a raw environment pointer.
    ///
    /// # Safety
    ///
    /// `raw` must be a valid `JNIEnv*` attached to the calling thread for as
    /// long as the returned value is used.
    pub unsafe fn from_raw(raw: RawEnv) -> Self {
        JniEnv { raw }
    }

    pub fn find_class(&self, name: &CStr) -> Option<jclass> {
        // SAFETY: slot type matches `FindClass`; `self.raw` is valid per `from_raw`.
        let class = unsafe {
            let f: unsafe extern "system" fn(RawEnv, *const c_char) -> jclass = table_fn(self.raw, FIND_CLASS);
            f(self.raw, name.as_ptr())
        };
        if class.is_null() {
            // A failed lookup leaves NoClassDefFoundError pending.
            self.exception_clear();
            None
        } else {
            Some(class)
        }
    }

    pub fn exception_check(&self) -> bool {
        // SAFETY: slot type matches `ExceptionCheck`.
        unsafe {
            let f: unsafe extern "system" fn(RawEnv) -> jboolean = table_fn(self.raw, EXCEPTION_CHECK);
            f(self.raw) == JNI_TRUE
        }
    }

    pub fn exception_describe(&self) {
        // SAFETY: slot type matches `ExceptionDescribe`.
        unsafe {
            let f: unsafe extern "system" fn(RawEnv) = table_fn(self.raw, EXCEPTION_DESCRIBE);
            f(self.raw)
        }
    }

    pub fn exception_clear(&self) {
        // SAFETY: slot type matches `ExceptionClear`.
        unsafe {
            let f: unsafe extern "system" fn(RawEnv) = table_fn(self.raw, EXCEPTION_CLEAR);
            f(self.raw)
        }
    }

    pub fn delete_local_ref(&self, obj: jobject) {
        if obj.is_null() {
            return;
        }
        // SAFETY: slot type matches `DeleteLocalRef`; `obj` is a local reference.
        unsafe {
            let f: unsafe extern "system" fn(RawEnv, jobject) = table_fn(self.raw, DELETE_LOCAL_REF);
            f(self.raw, obj)
        }
    }

    pub fn get_static_method_id(&self, class: jclass, name: &CStr, signature: &CStr) -> Option<jmethodID> {
        // SAFETY: slot type matches `GetStaticMethodID`.
        let id = unsafe {
            let f: unsafe extern "system" fn(RawEnv, jclass, *const c_char, *const c_char) -> jmethodID =
                table_fn(self.raw, GET_STATIC_METHOD_ID);
            f(self.raw, class, name.as_ptr(), signature.as_ptr())
        };
        if id.is_null() {
            self.exception_clear();
            None
        } else {
            Some(id)
        }
    }

    pub fn call_static_void_method(&self, class: jclass, method: jmethodID, args: &[jvalue]) {
        // SAFETY: slot type matches `CallStaticVoidMethodA`; `args` matches the method signature.
        unsafe {
            let f: unsafe extern "system" fn(RawEnv, jclass, jmethodID, *const jvalue) =
                table_fn(self.raw, CALL_STATIC_VOID_METHOD_A);
            f(self.raw, class, method, args.as_ptr())
        }
    }

    pub fn new_string_utf(&self, s: &CStr) -> Option<jstring> {
        // SAFETY: slot type matches `NewStringUTF`.
        let string = unsafe {
            let f: unsafe extern "system" fn(RawEnv, *const c_char) -> jstring = table_fn(self.raw, NEW_STRING_UTF);
            f(self.raw, s.as_ptr())
        };
        (!string.is_null()).then_some(string)
    }

    /// Create a Java string from Rust text, converting it to modified UTF-8.
    pub fn new_string(&self, s: &str) -> Option<jstring> {
        let text = CString::new(to_modified_utf8(s)).ok()?;
        self.new_string_utf(&text)
    }

    /// Copy a Java string out as Rust text. `None` for a null reference.
    pub fn get_string(&self, s: jstring) -> Option<String> {
        if s.is_null() {
            return None;
        }
        // SAFETY: slot types match `GetStringUTFChars`/`ReleaseStringUTFChars`;
        // the chars are released before returning.
        unsafe {
            let get: unsafe extern "system" fn(RawEnv, jstring, *mut jboolean) -> *const c_char =
                table_fn(self.raw, GET_STRING_UTF_CHARS);
            let release: unsafe extern "system" fn(RawEnv, jstring, *const c_char) =
                table_fn(self.raw, RELEASE_STRING_UTF_CHARS);
            let chars = get(self.raw, s, ptr::null_mut());
            if chars.is_null() {
                return None;
            }
            let text = CStr::from_ptr(chars).to_string_lossy().into_owned();
            release(self.raw, s, chars);
            Some(text)
        }
    }

    pub fn new_object_array(&self, len: jsize, class: jclass) -> Option<jobjectArray> {
        // SAFETY: slot type matches `NewObjectArray`.
        let array = unsafe {
            let f: unsafe extern "system" fn(RawEnv, jsize, jclass, jobject) -> jobjectArray =
                table_fn(self.raw, NEW_OBJECT_ARRAY);
            f(self.raw, len, class, ptr::null_mut())
        };
        (!array.is_null()).then_some(array)
    }

    pub fn set_object_array_element(&self, array: jobjectArray, index: jsize, value: jobject) {
        // SAFETY: slot type matches `SetObjectArrayElement`.
        unsafe {
            let f: unsafe extern "system" fn(RawEnv, jobjectArray, jsize, jobject) =
                table_fn(self.raw, SET_OBJECT_ARRAY_ELEMENT);
            f(self.raw, array, index, value)
        }
    }

    /// Build a `String[]` from Rust strings via [`new_string`](Self::new_string).
    pub fn new_string_array<S: AsRef<str>>(&self, items: &[S]) -> Option<jobjectArray> {
        let string_class = self.find_class(c"java/lang/String")?;
        let array = self.new_object_array(items.len() as jsize, string_class);
        self.delete_local_ref(string_class);
        let array = array?;
        for (i, item) in items.iter().enumerate() {
            let s = self.new_string(item.as_ref())?;
            self.set_object_array_element(array, i as jsize, s);
            self.delete_local_ref(s);
        }
        Some(array)
    }

    fn register_natives(&self, class: jclass, methods: &[JNINativeMethod]) -> jint {
        // SAFETY: slot type matches `RegisterNatives`; `methods` outlives the call.
        unsafe {
            let f: unsafe extern "system" fn(RawEnv, jclass, *const JNINativeMethod, jint) -> jint =
                table_fn(self.raw, REGISTER_NATIVES);
            f(self.raw, class, methods.as_ptr(), methods.len() as jint)
        }
    }
}

#[cfg(unix)]
mod dl {
    use anyhow::{Result, bail};
    use std::ffi::{CStr, CString, c_void};
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    /// A `dlopen`ed library. Never closed: a JVM cannot be unloaded.
    pub struct Library {
        handle: *mut c_void,
    }

    fn last_error() -> String {
        // SAFETY: dlerror returns null or a NUL-terminated thread-local message.
        unsafe {
            let msg = libc::dlerror();
            if msg.is_null() {
                "unknown error".to_string()
            } else {
                CStr::from_ptr(msg).to_string_lossy().into_owned()
            }
        }
    }

    pub fn open(path: &Path) -> Result<Library> {
        let c_path = CString::new(path.as_os_str().as_bytes())?;
        // SAFETY: c_path is a valid NUL-terminated path.
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_GLOBAL) };
        if handle.is_null() {
            bail!("dlopen {}: {}", path.display(), last_error());
        }
        Ok(Library { handle })
    }

    impl Library {
        pub fn symbol(&self, name: &CStr) -> Result<*mut c_void> {
            // SAFETY: handle came from dlopen and is never closed.
            let sym = unsafe {
                libc::dlerror();
                libc::dlsym(self.handle, name.as_ptr())
            };
            if sym.is_null() {
                bail!("dlsym {}: {}", name.to_string_lossy(), last_error());
            }
            Ok(sym)
        }
    }
}

#[cfg(not(unix))]
mod dl {
    use anyhow::{Result, bail};
    use std::ffi::{CStr, c_void};
    use std::path::Path;

    pub struct Library {
        _private: (),
    }

    pub fn open(path: &Path) -> Result<Library> {
        bail!("cannot load {}: dynamic loading is not supported on this platform", path.display())
    }

    impl Library {
        pub fn symbol(&self, name: &CStr) -> Result<*mut c_void> {
            bail!("symbol {} unavailable", name.to_string_lossy())
        }
    }
}

/// Loads `libjvm` from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct JvmLoader;

impl RuntimeLoader for JvmLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn RuntimeLibrary>> {
        let library = dl::open(path)?;
        let symbol = library.symbol(CREATE_JAVA_VM)?;
        // SAFETY: JNI_CreateJavaVM has exactly this signature in every JVM.
        let create = unsafe { std::mem::transmute::<*mut c_void, CreateJavaVmFn>(symbol) };
        info!("loaded java VM library {}", path.display());
        Ok(Box::new(JvmLibrary {
            _library: library,
            create,
        }))
    }
}

struct JvmLibrary {
    _library: dl::Library,
    create: CreateJavaVmFn,
}

impl RuntimeLibrary for JvmLibrary {
    fn create_runtime(&self, options: &NativeArgv) -> Result<Box<dyn RuntimeInstance>> {
        let mut vm_options = Vec::with_capacity(options.len());
        let mut cursor = options.as_ptr();
        // SAFETY: `options` is null-terminated and outlives this loop.
        unsafe {
            while !(*cursor).is_null() {
                vm_options.push(JavaVMOption {
                    option_string: (*cursor).cast_mut(),
                    extra_info: ptr::null_mut(),
                });
                cursor = cursor.add(1);
            }
        }

        let mut init_args = JavaVMInitArgs {
            version: JNI_VERSION_1_8,
            n_options: vm_options.len() as jint,
            options: vm_options.as_mut_ptr(),
            ignore_unrecognized: JNI_FALSE,
        };
        let mut vm: RawVm = ptr::null_mut();
        let mut env: *mut c_void = ptr::null_mut();
        // SAFETY: all pointers are valid for the duration of the call.
        let rc = unsafe {
            (self.create)(
                &mut vm,
                &mut env,
                (&mut init_args as *mut JavaVMInitArgs).cast(),
            )
        };
        if rc != JNI_OK || vm.is_null() || env.is_null() {
            bail!("JNI_CreateJavaVM returned {rc}");
        }
        debug!("java VM created with {} options", vm_options.len());
        Ok(Box::new(JvmInstance {
            vm,
            // SAFETY: env was just produced for this thread by JNI_CreateJavaVM.
            env: unsafe { JniEnv::from_raw(env.cast()) },
        }))
    }
}

struct JvmInstance {
    vm: RawVm,
    env: JniEnv,
}

impl RuntimeEnv for JvmInstance {
    fn register_natives(&mut self, class: &str, methods: &[NativeMethod]) -> Result<Registration> {
        let class_name = CString::new(class)?;
        let Some(clazz) = self.env.find_class(&class_name) else {
            return Ok(Registration::ClassNotFound);
        };
        let table: Vec<JNINativeMethod> = methods
            .iter()
            .map(|m| JNINativeMethod {
                name: m.name.as_ptr().cast_mut(),
                signature: m.signature.as_ptr().cast_mut(),
                fn_ptr: m.fn_ptr,
            })
            .collect();
        let rc = self.env.register_natives(clazz, &table);
        self.env.delete_local_ref(clazz);
        if rc != JNI_OK {
            if self.env.exception_check() {
                self.env.exception_describe();
                self.env.exception_clear();
            }
            bail!("RegisterNatives for {class} returned {rc}");
        }
        Ok(Registration::Registered)
    }
}

impl RuntimeInstance for JvmInstance {
    fn env(&mut self) -> &mut dyn RuntimeEnv {
        self
    }

    fn invoke_main(&mut self, class: &EntryPoint, args: &NativeArgv) -> Result<()> {
        let env = self.env;
        let class_name = CString::new(class.as_str())?;
        let clazz = env
            .find_class(&class_name)
            .ok_or_else(|| anyhow!("could not find main class {class}"))?;
        let main = env
            .get_static_method_id(clazz, c"main", c"([Ljava/lang/String;)V")
            .ok_or_else(|| anyhow!("could not find main method in {class}"));
        let main = match main {
            Ok(m) => m,
            Err(e) => {
                env.delete_local_ref(clazz);
                return Err(e);
            }
        };
        let array = env
            .new_string_array(&args.to_strings())
            .context("could not build the argument array");
        let array = match array {
            Ok(a) => a,
            Err(e) => {
                env.delete_local_ref(clazz);
                return Err(e);
            }
        };

        env.call_static_void_method(clazz, main, &[jvalue { l: array }]);
        if env.exception_check() {
            warn!("main class {class} threw an exception");
            env.exception_describe();
            env.exception_clear();
        }

        env.delete_local_ref(array);
        env.delete_local_ref(clazz);
        Ok(())
    }

    fn destroy(self: Box<Self>) -> ExitCode {
        // SAFETY: slot type matches `DestroyJavaVM`; the VM is destroyed exactly once
        // because `self` is consumed.
        unsafe {
            let f: unsafe extern "system" fn(RawVm) -> jint = table_fn(self.vm, DESTROY_JAVA_VM);
            f(self.vm)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_loading_missing_library_fails() {
        let err = JvmLoader
            .load(&PathBuf::from("/definitely/not/here/libjvm.so"))
            .err()
            .unwrap();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn test_modified_utf8_encoding() {
        assert_eq!(to_modified_utf8("abc"), b"abc");
        assert_eq!(to_modified_utf8("é"), [0xC3, 0xA9]);
        assert_eq!(to_modified_utf8("a\0b"), [b'a', 0xC0, 0x80, b'b']);
        // U+1F600 as the surrogate pair D83D DE00.
        assert_eq!(
            to_modified_utf8("\u{1F600}"),
            [0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80]
        );
        assert!(!to_modified_utf8("x\0\u{10FFFF}").contains(&0));
    }

    #[test]
    fn test_jvalue_holds_a_pointer() {
        assert!(std::mem::size_of::<jvalue>() >= std::mem::size_of::<jobject>());
        assert_eq!(std::mem::size_of::<jvalue>(), 8);
    }
}
