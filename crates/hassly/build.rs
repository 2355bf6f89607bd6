use std::fs;
use std::path::PathBuf;

use clap::CommandFactory;

// cli.rs only needs clap, clap_complete and serde_json, all of which are
// build-dependencies, so it can be compiled on its own here.
#[path = "src/cli.rs"]
mod cli;

fn main() {
    println!("cargo::rerun-if-changed=src/cli.rs");

    let out_dir: PathBuf =
        std::env::var_os("OUT_DIR").expect("OUT_DIR not set by Cargo").into();
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("failed to create man output directory");

    let mut pages = Vec::new();
    collect_pages(cli::Cli::command(), &mut pages);

    for (name, page) in pages {
        let path = man_dir.join(format!("{name}.1"));
        fs::write(&path, page)
            .unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
    }
}

/// Render `hassly.1` plus one `hassly-<sub>.1` page per visible subcommand.
fn collect_pages(cmd: clap::Command, pages: &mut Vec<(String, Vec<u8>)>) {
    let name = cmd.get_name().to_owned();

    let mut page = Vec::new();
    clap_mangen::Man::new(cmd.clone())
        .render(&mut page)
        .unwrap_or_else(|e| panic!("failed to render man page for `{name}`: {e}"));
    pages.push((name.clone(), page));

    for sub in cmd.get_subcommands().filter(|sub| !sub.is_hide_set()) {
        let renamed = sub.clone().name(format!("{name}-{}", sub.get_name()));
        collect_pages(renamed, pages);
    }
}
