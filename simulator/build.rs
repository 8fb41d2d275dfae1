//! Build script for screensaver-simulator
//!
//! On Windows, links against the SDL2 import library in `vendor/sdl2` and
//! places SDL2.dll next to the binary.

use std::path::PathBuf;
use std::{env, fs};

fn main() {
    if env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "windows" {
        return;
    }

    let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") else {
        return;
    };
    let Some(root) = PathBuf::from(manifest_dir).parent().map(PathBuf::from) else {
        return;
    };
    let vendor_sdl2 = root.join("vendor").join("sdl2");
    println!("cargo:rerun-if-changed={}", vendor_sdl2.display());

    if !vendor_sdl2.exists() {
        println!("cargo:warning=SDL2 not found in {}", vendor_sdl2.display());
        return;
    }
    println!("cargo:rustc-link-search=native={}", vendor_sdl2.display());

    // OUT_DIR is target/<profile>/build/<pkg>/out; the binary lands in target/<profile>.
    let Ok(out_dir) = env::var("OUT_DIR") else {
        return;
    };
    let out_path = PathBuf::from(out_dir);
    let Some(profile_dir) = out_path
        .ancestors()
        .find(|p| p.file_name().is_some_and(|n| n == "release" || n == "debug"))
    else {
        return;
    };

    let dll_dst = profile_dir.join("SDL2.dll");
    if !dll_dst.exists()
        && let Err(e) = fs::copy(vendor_sdl2.join("SDL2.dll"), &dll_dst)
    {
        println!("cargo:warning=copying SDL2.dll: {e}");
    }
}
