#![allow(dead_code)]

use std::fs;
use std::path::Path;

use fsigma_eval::{CompilerOptions, Engine, RuleMeta, compile_rule};
use fsigma_parser::parse_rule_yaml;
use serde_json::Value;

pub fn engine_from_yaml(yaml: &str) -> Engine {
    let collection = parse_rule_yaml(yaml);
    assert!(collection.errors.is_empty(), "{:?}", collection.errors);
    let rules = collection
        .documents
        .iter()
        .map(|doc| compile_rule(doc, &CompilerOptions::default()).unwrap())
        .collect();
    Engine::new(rules)
}

pub fn eval(yaml: &str, record: Value) -> Vec<RuleMeta> {
    engine_from_yaml(yaml).evaluate(&record)
}

pub fn titles(matches: &[RuleMeta]) -> Vec<&str> {
    matches.iter().map(|m| m.title.as_str()).collect()
}

/// Write `contents` to `dir/name`, creating parent directories.
pub fn write_rule(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

pub fn rule_yaml(title: &str, field: &str, value: &str) -> String {
    format!(
        "title: {title}\nid: {id}\nlevel: high\ndetection:\n    selection:\n        {field}: '{value}'\n    condition: selection\n",
        id = title.to_lowercase().replace(' ', "-"),
    )
}
