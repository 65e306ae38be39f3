use std::io::Write;

use anstyle::{AnsiColor, Color, RgbColor, Style};

/// 每个日志等级使用的前景色
fn level_color(level: log::Level) -> Option<Color> {
    match level {
        log::Level::Error => Some(Color::Ansi(AnsiColor::Red)),
        log::Level::Warn => Some(Color::Ansi(AnsiColor::Yellow)),
        log::Level::Info => Some(Color::Ansi(AnsiColor::Green)),
        log::Level::Debug => Some(Color::Ansi(AnsiColor::Cyan)),
        log::Level::Trace => None,
    }
}

/// 只保留文件名，兼容 `/` 与 `\` 两种分隔符
fn short_file_name(file: &str) -> &str {
    file.rsplit(['/', '\\']).next().unwrap_or(file)
}

/// 初始化全局 logger
///
/// 格式为 `[HH:MM:SS] LEVEL [file:line] message`，默认等级为 Info，
/// 可以通过 `RUST_LOG` 环境变量覆盖。
///
/// 重复调用是安全的，只有第一次生效
pub fn init_log() {
    let result = env_logger::Builder::new()
        .filter(None, log::LevelFilter::Info)
        .parse_default_env()
        .format(|buf, record| {
            let level_style = Style::new().fg_color(level_color(record.level())).bold();
            let location_style = Style::new().fg_color(Some(Color::Rgb(RgbColor(110, 110, 110))));

            let time = chrono::Local::now().format("%H:%M:%S");
            let file = short_file_name(record.file().unwrap_or(""));
            let line = record.line().unwrap_or(0);

            writeln!(
                buf,
                "{level_style}[{time}] {:<5}{level_style:#} {location_style}[{file}:{line}]{location_style:#} {}",
                record.level(),
                record.args()
            )
        })
        .try_init();

    if result.is_err() {
        log::debug!("logger already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_file_name_strips_both_separators() {
        assert_eq!(short_file_name("engine/crates/a/src/lib.rs"), "lib.rs");
        assert_eq!(short_file_name("engine\\crates\\b\\main.rs"), "main.rs");
        assert_eq!(short_file_name("plain.rs"), "plain.rs");
    }

    #[test]
    fn init_log_twice_does_not_panic() {
        init_log();
        init_log();
        log::info!("logger initialized");
    }
}
