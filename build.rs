//! Build script for redcache
//!
//! Handles platform-specific configuration:
//! - Windows: Embeds the application manifest for long path support (>260 chars)
//!
//! # Windows Long Path Support
//!
//! Windows limits file paths to 260 characters (MAX_PATH) by default.
//! Cache paths nest domain directories and long provider filenames under
//! a potentially deep user cache directory, which can exceed the limit.
//!
//! The manifest file (`redcache.manifest`) includes `longPathAware=true`
//! which, combined with the Windows 10 v1607+ registry setting, enables
//! paths up to 32,767 characters.

fn main() {
    // Only compile and embed the manifest on Windows
    #[cfg(windows)]
    {
        // The .rc file references the manifest via RT_MANIFEST
        embed_resource::compile("redcache.rc", embed_resource::NONE);

        println!("cargo:rerun-if-changed=redcache.rc");
        println!("cargo:rerun-if-changed=redcache.manifest");
    }

    // Nothing to do on other platforms
    #[cfg(not(windows))]
    {}
}
