use std::collections::BTreeMap;
use std::env;
use std::fmt::Write;
use std::path::PathBuf;

/// Settings that can be overridden with `TROUBLE_PAWR_<NAME>` at build time.
static CONFIGS: &[(&str, usize)] = &[
    // (Name, default)
    ("MAX_ADV_SETS", 1),
    ("EVENT_QUEUE_SIZE", 4),
    ("CONNECTION_EVENT_QUEUE_SIZE", 2),
    ("COMMAND_TIMEOUT_MS", 2000),
    ("MAX_SUBEVENTS_PER_REQUEST", 4),
];

fn main() {
    let mut configs = BTreeMap::new();
    for (name, default) in CONFIGS {
        configs.insert(*name, *default);
    }

    let prefix = "TROUBLE_PAWR_";
    for (var, value) in env::vars() {
        if let Some(name) = var.strip_prefix(prefix) {
            let Some(cfg) = configs.get_mut(name) else {
                panic!("Unknown configuration setting {}", var);
            };
            *cfg = match value.parse() {
                Ok(v) => v,
                Err(_) => panic!("Configuration setting {} is not a number: {}", var, value),
            };
        }
    }

    for name in configs.keys() {
        println!("cargo:rerun-if-env-changed={}{}", prefix, name);
    }

    let mut data = String::new();
    for (name, value) in configs.iter() {
        writeln!(&mut data, "pub const {}: usize = {};", name, value).unwrap();
    }

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    std::fs::write(out_dir.join("config.rs"), data).unwrap();
}
