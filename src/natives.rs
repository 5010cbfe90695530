//! Native callback surfaces exposed to code running inside the runtime.
//!
//! Each surface is an independent [`NativeRegistrar`]. The launcher registers
//! them in the order of [`default_registrars`] and stops at the first failure.

use crate::config::IniConfig;
use crate::jni::{JniEnv, RawEnv, jclass, jlong, jobjectArray, jstring};
use crate::runtime::{NativeMethod, Registration, RuntimeEnv};
use anyhow::Result;
use log::{debug, info, warn};
use std::ffi::c_void;
use std::ptr;
use std::sync::Mutex;

/// A group of native methods bound to one runtime class.
pub trait NativeRegistrar {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Slash-separated class the methods belong to.
    fn class_name(&self) -> &'static str;

    fn methods(&self) -> Vec<NativeMethod>;

    /// Bind the methods in `env`.
    ///
    /// A class missing from the classpath is not an error: the application
    /// simply does not use this surface.
    fn register(&self, env: &mut dyn RuntimeEnv) -> Result<()> {
        register_table(env, self.name(), self.class_name(), &self.methods())
    }
}

fn register_table(
    env: &mut dyn RuntimeEnv,
    name: &str,
    class: &str,
    methods: &[NativeMethod],
) -> Result<()> {
    match env.register_natives(class, methods)? {
        Registration::Registered => info!("registered {} {name} natives on {class}", methods.len()),
        Registration::ClassNotFound => warn!("could not find {class}, skipping {name} natives"),
    }
    Ok(())
}

/// The callback surfaces in registration order: configuration, splash, registry, shell.
pub fn default_registrars(config: &IniConfig) -> Vec<Box<dyn NativeRegistrar>> {
    vec![
        Box::new(ConfigNatives::new(config)),
        Box::new(SplashNatives),
        Box::new(RegistryNatives),
        Box::new(ShellNatives),
    ]
}

static PROPERTIES: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());

fn new_jstring(env: &JniEnv, value: &str) -> jstring {
    env.new_string(value).unwrap_or(ptr::null_mut())
}

/// Read access to the launcher configuration from managed code.
pub struct ConfigNatives {
    properties: Vec<(String, String)>,
}

impl ConfigNatives {
    pub fn new(config: &IniConfig) -> Self {
        Self {
            properties: config
                .pairs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl NativeRegistrar for ConfigNatives {
    fn name(&self) -> &'static str {
        "config"
    }

    fn class_name(&self) -> &'static str {
        "org/boris/winrun4j/INI"
    }

    fn methods(&self) -> Vec<NativeMethod> {
        vec![
            NativeMethod {
                name: c"getProperty",
                signature: c"(Ljava/lang/String;)Ljava/lang/String;",
                fn_ptr: ini_get_property as *mut c_void,
            },
            NativeMethod {
                name: c"getPropertyKeys",
                signature: c"()[Ljava/lang/String;",
                fn_ptr: ini_get_property_keys as *mut c_void,
            },
        ]
    }

    fn register(&self, env: &mut dyn RuntimeEnv) -> Result<()> {
        // Natives can only reach the configuration through this snapshot.
        if let Ok(mut props) = PROPERTIES.lock() {
            *props = self.properties.clone();
        }
        register_table(env, self.name(), self.class_name(), &self.methods())
    }
}

fn find_property(props: &[(String, String)], key: &str) -> Option<String> {
    let key = key.to_lowercase();
    props.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone())
}

fn lookup_property(key: &str) -> Option<String> {
    let props = PROPERTIES.lock().ok()?;
    find_property(&props, key)
}

extern "system" fn ini_get_property(raw: RawEnv, _class: jclass, key: jstring) -> jstring {
    // SAFETY: the runtime passes a valid env for the calling thread.
    let env = unsafe { JniEnv::from_raw(raw) };
    let Some(key) = env.get_string(key) else {
        return ptr::null_mut();
    };
    match lookup_property(&key) {
        Some(value) => new_jstring(&env, &value),
        None => ptr::null_mut(),
    }
}

extern "system" fn ini_get_property_keys(raw: RawEnv, _class: jclass) -> jobjectArray {
    // SAFETY: the runtime passes a valid env for the calling thread.
    let env = unsafe { JniEnv::from_raw(raw) };
    let keys: Vec<String> = match PROPERTIES.lock() {
        Ok(props) => props.iter().map(|(k, _)| k.clone()).collect(),
        Err(_) => Vec::new(),
    };
    env.new_string_array(&keys).unwrap_or(ptr::null_mut())
}

/// Lets managed code dismiss the splash image.
pub struct SplashNatives;

impl NativeRegistrar for SplashNatives {
    fn name(&self) -> &'static str {
        "splash"
    }

    fn class_name(&self) -> &'static str {
        "org/boris/winrun4j/SplashScreen"
    }

    fn methods(&self) -> Vec<NativeMethod> {
        vec![NativeMethod {
            name: c"close",
            signature: c"()V",
            fn_ptr: splash_close as *mut c_void,
        }]
    }
}

extern "system" fn splash_close(_raw: RawEnv, _class: jclass) {
    info!("splash close requested");
}

/// Registry access. There is no registry outside Windows, so every call reports "absent".
pub struct RegistryNatives;

impl NativeRegistrar for RegistryNatives {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn class_name(&self) -> &'static str {
        "org/boris/winrun4j/RegistryKey"
    }

    fn methods(&self) -> Vec<NativeMethod> {
        vec![
            NativeMethod {
                name: c"openKeyHandle",
                signature: c"(JLjava/lang/String;)J",
                fn_ptr: registry_open_key as *mut c_void,
            },
            NativeMethod {
                name: c"closeKeyHandle",
                signature: c"(J)V",
                fn_ptr: registry_close_key as *mut c_void,
            },
            NativeMethod {
                name: c"getString",
                signature: c"(JLjava/lang/String;)Ljava/lang/String;",
                fn_ptr: registry_get_string as *mut c_void,
            },
        ]
    }
}

extern "system" fn registry_open_key(_raw: RawEnv, _class: jclass, _parent: jlong, _name: jstring) -> jlong {
    debug!("registry is not available on this platform");
    0
}

extern "system" fn registry_close_key(_raw: RawEnv, _class: jclass, _handle: jlong) {}

extern "system" fn registry_get_string(_raw: RawEnv, _class: jclass, _handle: jlong, _name: jstring) -> jstring {
    ptr::null_mut()
}

/// Process environment queries for managed code.
pub struct ShellNatives;

impl NativeRegistrar for ShellNatives {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn class_name(&self) -> &'static str {
        "org/boris/winrun4j/Environment"
    }

    fn methods(&self) -> Vec<NativeMethod> {
        vec![
            NativeMethod {
                name: c"getEnvironmentVariable",
                signature: c"(Ljava/lang/String;)Ljava/lang/String;",
                fn_ptr: shell_get_env as *mut c_void,
            },
            NativeMethod {
                name: c"getCurrentDirectory",
                signature: c"()Ljava/lang/String;",
                fn_ptr: shell_current_dir as *mut c_void,
            },
        ]
    }
}

extern "system" fn shell_get_env(raw: RawEnv, _class: jclass, name: jstring) -> jstring {
    // SAFETY: the runtime passes a valid env for the calling thread.
    let env = unsafe { JniEnv::from_raw(raw) };
    match env.get_string(name).and_then(|n| std::env::var(n).ok()) {
        Some(value) => new_jstring(&env, &value),
        None => ptr::null_mut(),
    }
}

extern "system" fn shell_current_dir(raw: RawEnv, _class: jclass) -> jstring {
    // SAFETY: the runtime passes a valid env for the calling thread.
    let env = unsafe { JniEnv::from_raw(raw) };
    match std::env::current_dir() {
        Ok(dir) => new_jstring(&env, &dir.to_string_lossy()),
        Err(_) => ptr::null_mut(),
    }
}
