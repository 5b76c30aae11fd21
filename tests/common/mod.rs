// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use larder::hash::{HashAlgorithm, hash_file};
use larder::recipe::{Kitchen, KitchenConfig, ToolPaths};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Write a `.tar.gz` source archive with every file under `<top>/`
///
/// Returns the archive path and its `sha256:` checksum string.
pub fn source_tarball(dir: &Path, top: &str, files: &[(&str, &str)]) -> (PathBuf, String) {
    let path = dir.join(format!("{}.tar.gz", top));
    let encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}/{}", top, name), content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();

    let checksum = hash_file(HashAlgorithm::Sha256, &path).unwrap();
    (path, checksum.to_string())
}

/// Kitchen rooted in a scratch directory
///
/// `patchelf` is replaced with `true` so fake libraries survive
/// normalization.
pub fn scratch_kitchen(dir: &Path) -> Kitchen {
    Kitchen::new(KitchenConfig {
        source_cache: dir.join("cache"),
        dependency_root: dir.join("deps"),
        work_root: Some(dir.join("work")),
        jobs: 2,
        tools: ToolPaths {
            patchelf: PathBuf::from("true"),
            ..ToolPaths::default()
        },
        ..KitchenConfig::default()
    })
}

/// Header shipped in the demo source archive
pub const DEMO_HEADER: &str = "int demo_answer(void);\n";

/// Patch adding a line to the demo header
pub const DEMO_PATCH: &str = "\
--- a/demo.h
+++ b/demo.h
@@ -1 +1,2 @@
 int demo_answer(void);
+#define DEMO_PATCHED 1
";

/// Patch that only applies on top of `DEMO_PATCH`
pub const DEMO_FOLLOWUP_PATCH: &str = "\
--- a/demo.h
+++ b/demo.h
@@ -1,2 +1,3 @@
 int demo_answer(void);
 #define DEMO_PATCHED 1
+#define DEMO_FOLLOWUP 2
";

/// Patch whose context does not match the demo header
pub const BAD_PATCH: &str = "\
--- a/demo.h
+++ b/demo.h
@@ -1 +1,2 @@
 int something_else(void);
+#define DEMO_PATCHED 1
";

/// Recipe for a script-built demo library
///
/// The install step lays out what an autotools install would: a versioned
/// shared library, a header directory and a `.pc` file rooted at the
/// install prefix.
pub fn demo_recipe(archive: &Path, checksum: &str, patches: &[&str]) -> String {
    let patches: String = patches
        .iter()
        .map(|p| format!("\n[[patches]]\nfile = \"{}\"\n", p))
        .collect();

    r#"
[package]
name = "demo"
version = "1.0"
platforms = ["linux"]

[source]
archive = "@ARCHIVE@"
checksum = "@CHECKSUM@"
@PATCHES@
[build]
system = "script"
configure = "mkdir -p %(builddir)s"
make = "printf 'fake shared object' > %(builddir)s/libdemo-1.0.so.0"
install = '''
mkdir -p "$PREFIX/lib/pkgconfig" "$PREFIX/include/demo-1.0" &&
cp demo.h "$PREFIX/include/demo-1.0/" &&
cp "$BUILD_DIR/libdemo-1.0.so.0" "$PREFIX/lib/" &&
printf 'prefix=%s\nlibdir=%s/lib\nincludedir=%s/include/demo-1.0\n\nName: demo\nDescription: Demo library\nVersion: 1.0\nLibs: -L${libdir} -ldemo-1.0\nCflags: -I${includedir}\n' "$PREFIX" "$PREFIX" "$PREFIX" > "$PREFIX/lib/pkgconfig/demo-1.0.pc"
'''

[artifact]
pkgconfig = "demo-1.0.pc"
link_name = "demo-1.0"
headers = ["include/demo-1.0"]

[artifact.upstream]
linux = "libdemo-1.0.so.0"
"#
    .replace("@ARCHIVE@", &archive.display().to_string())
    .replace("@CHECKSUM@", checksum)
    .replace("@PATCHES@", &patches)
}
