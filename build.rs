//   Copyright (c) 2024-2026 Anton Kundenko <singaraiona@gmail.com>
//   All rights reserved.
//
//   Permission is hereby granted, free of charge, to any person obtaining a copy
//   of this software and associated documentation files (the "Software"), to deal
//   in the Software without restriction, including without limitation the rights
//   to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
//   copies of the Software, and to permit persons to whom the Software is
//   furnished to do so, subject to the following conditions:
//
//   The above copyright notice and this permission notice shall be included in all
//   copies or substantial portions of the Software.
//
//   THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
//   IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//   FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//   AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//   LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
//   OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
//   SOFTWARE.

use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=TEIDE_SRC_DIR");
    println!("cargo:rerun-if-env-changed=TEIDE_LIB_DIR");

    // Link a prebuilt engine archive instead of compiling from source.
    if let Ok(lib_dir) = std::env::var("TEIDE_LIB_DIR") {
        println!("cargo:rustc-link-search=native={lib_dir}");
        println!("cargo:rustc-link-lib=static=teide");
        link_system_libs();
        return;
    }

    // --- Compile the C engine ---
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let engine_root = std::env::var("TEIDE_SRC_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| manifest_dir.join("vendor/teide"));
    let src_dir = engine_root.join("src");
    let include_dir = engine_root.join("include");

    if !src_dir.is_dir() {
        panic!(
            "Teide engine sources not found at {} — run `git submodule update --init`, \
             or set TEIDE_SRC_DIR to an engine checkout or TEIDE_LIB_DIR to a prebuilt \
             libteide.a",
            engine_root.display()
        );
    }

    let c_files: Vec<PathBuf> = walkdir(&src_dir);

    let mut build = cc::Build::new();
    build
        .include(&include_dir)
        .include(&src_dir)
        .std("c17");

    let profile = std::env::var("PROFILE").unwrap_or_default();
    if profile == "debug" {
        build.flag("-O0").flag("-g");
    } else {
        build
            .flag("-O3")
            .flag("-mtune=generic")
            .define("NDEBUG", None);
    }

    for f in &c_files {
        build.file(f);
    }

    build.compile("teide");
    link_system_libs();

    println!("cargo:rerun-if-changed={}", src_dir.display());
    println!("cargo:rerun-if-changed={}", include_dir.display());
}

fn link_system_libs() {
    if cfg!(target_os = "linux") || cfg!(target_os = "macos") {
        println!("cargo:rustc-link-lib=m");
        println!("cargo:rustc-link-lib=pthread");
    }
}

/// Recursively collect all `.c` files under `dir`.
fn walkdir(dir: &std::path::Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                out.extend(walkdir(&path));
            } else if path.extension().is_some_and(|e| e == "c") {
                out.push(path);
            }
        }
    }
    out
}
