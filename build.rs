// build.rs

use glob::glob;
use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// A matrix fixture discovered in `data/fixtures/`.
#[derive(Debug)]
struct FixtureInstance {
    pub name: String,
    pub csv_path: PathBuf,
}

/// Discovers all fixture matrices by scanning the `data/fixtures/` directory.
fn get_all_fixtures(manifest_dir: &Path) -> Vec<FixtureInstance> {
    let pattern = manifest_dir.join("data/fixtures/*.csv");
    glob(pattern.to_str().expect("Manifest path is not valid UTF-8"))
        .expect("Failed to read glob pattern")
        .filter_map(|entry| {
            let csv_path = entry.ok()?;
            let name = csv_path
                .file_stem()?
                .to_string_lossy()
                .replace(['-', '.'], "_");
            Some(FixtureInstance { name, csv_path })
        })
        .collect()
}

fn main() {
    println!("cargo:rerun-if-changed=data/fixtures");

    // Get the Cargo output directory where we will place the generated code.
    let out_dir = env::var("OUT_DIR").unwrap();
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let dest_path = Path::new(&out_dir).join("fixture_tests.rs");
    let mut file = BufWriter::new(File::create(&dest_path).unwrap());

    // Generate a separate `#[test]` function for each fixture.
    for fixture in get_all_fixtures(&manifest_dir) {
        let csv_path_str = fixture.csv_path.to_str().unwrap();
        writeln!(
            file,
            r#"
#[test]
fn fixture_{name}() -> anyhow::Result<()> {{
    run_fixture_test("{csv_path}")
}}
"#,
            name = fixture.name,
            csv_path = csv_path_str.escape_default()
        )
        .unwrap();
    }
}
