use chrono::Local;
use nu_ansi_term::{Color, Style};
use std::fmt;
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    prelude::*,
    registry::LookupSpan,
    Layer,
};

/// Console + rolling file logging. The returned guard must stay alive
/// for the file layer to flush.
pub fn setup_logger() -> Option<WorkerGuard> {
    std::fs::create_dir_all("logs").ok();

    let file_appender = tracing_appender::rolling::hourly("logs", "sign");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // sqlx query logs are noise at INFO
    let file_filter = tracing_subscriber::filter::Targets::new()
        .with_target("sqlx", tracing::Level::WARN)
        .with_default(tracing::Level::INFO);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(FileFormatter)
        .with_filter(file_filter);

    let console_filter = tracing_subscriber::filter::Targets::new()
        .with_target("sqlx", tracing::Level::WARN)
        .with_default(tracing::Level::INFO);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .event_format(TerminalFormatter)
        .with_filter(console_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();

    Some(guard)
}

struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

pub struct TerminalFormatter;

impl<S, N> FormatEvent<S, N> for TerminalFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);
        let msg = visitor.message;

        let timestamp = Local::now().format("%H:%M:%S");
        let level = *event.metadata().level();
        let level_str = if level == tracing::Level::ERROR {
            Style::new().fg(Color::LightRed).paint("ERROR").to_string()
        } else if level == tracing::Level::WARN {
            Style::new()
                .fg(Color::LightYellow)
                .paint("WARN ")
                .to_string()
        } else {
            Style::new().fg(Color::LightBlue).paint("INFO ").to_string()
        };

        // Highlight outcome words the way operators scan for them
        let green = Style::new().fg(Color::LightGreen).bold();
        let red = Style::new().fg(Color::LightRed).bold();
        let colored_msg = if msg.contains("created") || msg.contains("Logged in") {
            msg.replace("created", &format!("{}", green.paint("created")))
                .replace("Logged in", &format!("{}", green.paint("Logged in")))
        } else if msg.contains("failed") || msg.contains("Failed") {
            msg.replace("failed", &format!("{}", red.paint("failed")))
                .replace("Failed", &format!("{}", red.paint("Failed")))
        } else {
            msg
        };

        write!(writer, "{} {} {}", timestamp, level_str, colored_msg)?;
        writeln!(writer)
    }
}

pub struct FileFormatter;

impl<S, N> FormatEvent<S, N> for FileFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let level = event.metadata().level();

        write!(writer, "{} [{}] ", timestamp, level)?;

        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);
        writeln!(writer, "{}", visitor.message)
    }
}
