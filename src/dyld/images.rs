//! The directory of images dyld currently has mapped into this process.

/// A loaded image, as reported by the image directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Position in the directory at the time of the scan
    pub index: u32,
    /// Runtime address of the image's Mach-O header
    pub base_address: u64,
    /// Difference between the runtime and link-time addresses (the "slide")
    pub relocation_offset: i64,
    /// Path dyld loaded the image from
    pub path: String,
    /// True if the image lives in the dyld shared cache
    pub in_shared_cache: bool,
}

impl Image {
    /// Returns the basename of the path.
    pub fn basename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Returns true if the path matches the given filter.
    pub fn matches_filter(&self, filter: &str) -> bool {
        self.path.contains(filter) || self.basename().contains(filter)
    }
}

/// Query surface over the set of loaded images.
///
/// Indices run from `0` to `image_count() - 1`. Images can be unloaded while
/// a scan is in progress, so per-index lookups return `None` for an index
/// that no longer resolves.
pub trait ImageDirectory {
    /// Number of images currently loaded.
    fn image_count(&self) -> u32;

    /// Runtime address of the image's Mach-O header.
    fn image_base(&self, index: u32) -> Option<u64>;

    /// Path of the image.
    fn image_path(&self, index: u32) -> Option<String>;

    /// The image's slide.
    fn image_relocation(&self, index: u32) -> i64;
}

// =============================================================================
// dyld
// =============================================================================

/// The live image list of the current process, read through dyld's
/// `_dyld_*` introspection API.
#[cfg(target_os = "macos")]
#[derive(Debug, Default, Clone, Copy)]
pub struct DyldImageDirectory;

#[cfg(target_os = "macos")]
#[allow(deprecated)]
impl ImageDirectory for DyldImageDirectory {
    fn image_count(&self) -> u32 {
        unsafe { libc::_dyld_image_count() }
    }

    fn image_base(&self, index: u32) -> Option<u64> {
        let header = unsafe { libc::_dyld_get_image_header(index) };
        if header.is_null() {
            // index out of bounds; unloaded or end of list
            return None;
        }
        Some(header as u64)
    }

    fn image_path(&self, index: u32) -> Option<String> {
        let name_ptr = unsafe { libc::_dyld_get_image_name(index) };
        if name_ptr.is_null() {
            return None;
        }
        let name = unsafe { std::ffi::CStr::from_ptr(name_ptr) };
        Some(name.to_string_lossy().into_owned())
    }

    fn image_relocation(&self, index: u32) -> i64 {
        unsafe { libc::_dyld_get_image_vmaddr_slide(index) as i64 }
    }
}
