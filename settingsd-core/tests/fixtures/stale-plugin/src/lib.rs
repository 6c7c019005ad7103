//! Exports the entry points of a plugin built against API version 0

#[unsafe(no_mangle)]
pub extern "C" fn _settingsd_plugin_api_version() -> u32 {
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn _settingsd_plugin_create() -> *mut u8 {
    std::ptr::null_mut()
}
