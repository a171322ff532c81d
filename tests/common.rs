#![allow(dead_code)]

use std::path::Path;
use std::sync::Once;

use lmq::Config;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = lmq::logging::init_logging(false);
    });
}

/// Defaults pointed at `dir` with small sizes so rotation and growth kick in.
pub fn config_in(dir: &Path) -> Config {
    let mut config = Config::default();
    config.queues.init_size = 4;
    config.recovery.dir = dir.join("recovery");
    config.recovery.file_size = 8;
    config.recovery.channel_capacity = 64;
    config.payload.file_base_path = dir.join("files");
    config
}

pub fn write_segment(dir: &Path, name: &str, lines: &[&str]) {
    std::fs::create_dir_all(dir).unwrap();
    let mut body = lines.join("\n");
    body.push('\n');
    std::fs::write(dir.join(name), body).unwrap();
}
