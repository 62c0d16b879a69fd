//! Data pack layout: `pack.mcmeta`, one `.mcfunction` file per sequence and
//! one JSON file per function tag.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use masm_codegen::symbol::{RuntimeFn, Symbol, Tag};
use masm_codegen::CompiledModule;
use serde_json::{json, Value};

/// `pack_format` written to `pack.mcmeta`; the last format that reads
/// functions from `functions/` directories.
pub const PACK_FORMAT: u32 = 41;

/// What [`write_pack`] wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackSummary {
    pub functions: usize,
    pub tags: usize,
}

fn invalid_name(name: &str, reason: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("{reason} `{name}`"))
}

/// Split `ns:path`; neither half may leave the directory it is joined to.
fn split_name(name: &str) -> io::Result<(&str, &str)> {
    let (namespace, path) = name
        .split_once(':')
        .ok_or_else(|| invalid_name(name, "unqualified name"))?;
    let contained = |part: &str| {
        !part.is_empty()
            && Path::new(part)
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
    };
    if !contained(namespace) || !contained(path) || namespace.contains('/') {
        return Err(invalid_name(name, "name escapes the pack"));
    }
    Ok((namespace, path))
}

/// `ns:a/b` → `<root>/data/ns/functions/a/b.mcfunction`
pub fn function_path(root: &Path, name: &str) -> io::Result<PathBuf> {
    let (namespace, path) = split_name(name)?;
    Ok(root
        .join("data")
        .join(namespace)
        .join("functions")
        .join(format!("{path}.mcfunction")))
}

/// `ns:a/b` → `<root>/data/ns/tags/functions/a/b.json`
pub fn tag_path(root: &Path, name: &str) -> io::Result<PathBuf> {
    let (namespace, path) = split_name(name)?;
    Ok(root
        .join("data")
        .join(namespace)
        .join("tags")
        .join("functions")
        .join(format!("{path}.json")))
}

/// Tag name → member function names across `modules`.
///
/// The load tag runs the runtime's load sequence first, then each module's
/// initialization in the order the modules are given.
pub fn tag_entries(modules: &[CompiledModule]) -> BTreeMap<&'static str, Vec<String>> {
    let mut entries: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
    for module in modules {
        for seq in &module.sequences {
            let name = || seq.symbol.qualified_name(&module.namespace);
            match seq.symbol {
                Symbol::Runtime(RuntimeFn::Load) => {
                    entries.entry(Tag::Load.name()).or_default().insert(0, name())
                }
                Symbol::Init => entries.entry(Tag::Load.name()).or_default().push(name()),
                _ => {}
            }
        }
        for (tag, symbol) in &module.tags {
            entries
                .entry(tag.name())
                .or_default()
                .push(symbol.qualified_name(&module.namespace));
        }
    }
    entries
}

/// Write every module of `modules` into a data pack rooted at `root`.
pub fn write_pack(
    root: &Path,
    description: &str,
    modules: &[CompiledModule],
) -> io::Result<PackSummary> {
    fs::create_dir_all(root)?;
    write_json(
        &root.join("pack.mcmeta"),
        &json!({ "pack": { "pack_format": PACK_FORMAT, "description": description } }),
    )?;

    let mut functions = 0;
    for module in modules {
        for (name, lines) in module.render() {
            let mut text = lines.join("\n");
            text.push('\n');
            write_file(&function_path(root, &name)?, &text)?;
            functions += 1;
        }
    }

    let tags = tag_entries(modules);
    for (tag, values) in &tags {
        write_json(&tag_path(root, tag)?, &json!({ "values": values }))?;
    }

    tracing::info!(
        root = %root.display(),
        functions,
        tags = tags.len(),
        "wrote data pack"
    );
    Ok(PackSummary {
        functions,
        tags: tags.len(),
    })
}

fn write_file(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}

fn write_json(path: &Path, value: &Value) -> io::Result<()> {
    let mut text = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    text.push('\n');
    write_file(path, &text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use masm_codegen::Sequence;

    fn module(namespace: &str, symbols: Vec<Symbol>) -> CompiledModule {
        CompiledModule {
            namespace: namespace.into(),
            sequences: symbols
                .into_iter()
                .map(|symbol| Sequence {
                    symbol,
                    commands: Vec::new(),
                })
                .collect(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_paths() {
        let root = Path::new("out");
        assert_eq!(
            function_path(root, "demo:__internal/funcs/0").unwrap(),
            Path::new("out/data/demo/functions/__internal/funcs/0.mcfunction")
        );
        assert_eq!(
            tag_path(root, "minecraft:load").unwrap(),
            Path::new("out/data/minecraft/tags/functions/load.json")
        );
        assert!(function_path(root, "unqualified").is_err());
    }

    #[test]
    fn test_paths_stay_inside_root() {
        let root = Path::new("out");
        for name in [
            "demo:../../../../escaped",
            "demo:a/../../b",
            "demo:/etc/passwd",
            "..:add",
            "a/b:add",
            ":add",
            "demo:",
        ] {
            let err = function_path(root, name).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "{name}");
            assert!(tag_path(root, name).is_err(), "{name}");
        }
    }

    #[test]
    fn test_runtime_load_runs_first() {
        let app = module("app", vec![Symbol::Init]);
        let runtime = module("masm", vec![Symbol::Runtime(RuntimeFn::Load)]);
        let mut lib = module("lib", vec![Symbol::Init, Symbol::SwapOutAll]);
        lib.tags.push((Tag::SwapOut, Symbol::SwapOutAll));

        let entries = tag_entries(&[app, runtime, lib]);
        assert_eq!(
            entries[Tag::Load.name()],
            vec!["masm:__internal/load", "app:__init", "lib:__init"]
        );
        assert_eq!(
            entries[Tag::SwapOut.name()],
            vec!["lib:__internal/mems/swap_out"]
        );
    }
}
