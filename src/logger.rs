use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Installs the global logger. `RUST_LOG` is honoured first; `level`
/// overrides it when given.
pub fn init(level: Option<LevelFilter>) {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, LevelFilter::Info)
        .parse_default_env();

    if let Some(level) = level {
        builder.filter(None, level);
    }

    // A second init (tests, embedding) is not an error worth surfacing.
    let _ = builder.try_init();

    log::debug!("Logger initialized.");
}
