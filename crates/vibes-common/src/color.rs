use std::io::IsTerminal;
use std::sync::OnceLock;

static NO_COLOR: OnceLock<bool> = OnceLock::new();

pub fn init(no_color_flag: bool) {
    let _ = NO_COLOR.set(
        no_color_flag || std::env::var("NO_COLOR").is_ok() || !std::io::stdout().is_terminal(),
    );
}

pub fn is_disabled() -> bool {
    *NO_COLOR.get().unwrap_or(&false)
}

mod codes {
    pub const RESET: &str = "\x1b[0m";
    pub const GREEN: &str = "\x1b[32m";
    pub const RED: &str = "\x1b[31m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
    pub const DIM: &str = "\x1b[90m";
    pub const BOLD: &str = "\x1b[1m";
}

fn paint(code: &str, text: &str) -> String {
    if is_disabled() {
        text.to_string()
    } else {
        format!("{}{}{}", code, text, codes::RESET)
    }
}

pub struct Colors;

impl Colors {
    pub fn success(text: &str) -> String {
        paint(codes::GREEN, text)
    }

    pub fn error(text: &str) -> String {
        paint(codes::RED, text)
    }

    pub fn warning(text: &str) -> String {
        paint(codes::YELLOW, text)
    }

    pub fn info(text: &str) -> String {
        paint(codes::CYAN, text)
    }

    pub fn dim(text: &str) -> String {
        paint(codes::DIM, text)
    }

    pub fn bold(text: &str) -> String {
        paint(codes::BOLD, text)
    }

    pub fn session_name(text: &str) -> String {
        if is_disabled() {
            text.to_string()
        } else {
            format!("{}{}{}{}", codes::BOLD, codes::CYAN, text, codes::RESET)
        }
    }

    /// Colors a session status word by its meaning.
    pub fn status(status: &str) -> String {
        match status {
            "running" => Self::info(status),
            "error" => Self::error(status),
            "stopped" => Self::warning(status),
            _ => Self::dim(status),
        }
    }
}
