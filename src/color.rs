//! Just enough ANSI styling for the clash-resolution diagnostics emitted to
//! standard output as informational text, plus CLI error/warning output. No
//! `log`/`tracing` dependency here — output is painted directly onto
//! `println!`/`eprintln!` calls.

pub const ERROR_COLOR: Option<&'static str> = Some("\x1b[38;5;203m");
pub const WARN_COLOR: Option<&'static str> = Some("\x1b[38;5;184m");
pub const INFO_COLOR: Option<&'static str> = Some("\x1b[38;5;80m");
pub const WINNER_COLOR: Option<&'static str> = Some("\x1b[38;5;42m");
pub const LOSER_COLOR: Option<&'static str> = Some("\x1b[38;5;248m");

#[macro_export]
/// Formats and returns a String with the provided ANSI terminal styling commands using an optional keyword argument for bold.
macro_rules! ansi_color {
    ($color:expr, bold=$is_bold:expr, $text:expr) => {{
        let bold_fmt = if $is_bold { "\x1b[1m" } else { "" };
        match $color {
            Some(color_code) => {
                let mut result = String::with_capacity(bold_fmt.len() + $text.len() + 16);
                result.push_str(bold_fmt);
                result.push_str(color_code);
                result.push_str($text.as_ref());
                result.push_str("\x1b[0m");
                result
            }
            None => $text.to_string(),
        }
    }};
    ($color:expr, $text:expr) => {
        $crate::ansi_color!($color, bold = false, $text)
    };
}

#[macro_export]
/// Concatenates provided strings using push_str to avoid the overhead of format! with explicit capacity bounds.
macro_rules! concat_str {
    ($($item:expr),*) => {{
        let total_length = 0 $( + $item.len() )*;
        let mut result = String::with_capacity(total_length);
        $( result.push_str($item.as_ref()); )*
        result
    }};
}

/// Prints an informational notice summarising a resolved clash: the winner,
/// the loser, and the key that decided between them.
pub fn print_clash_notice(key: &str, winner: &str, loser: &str) {
    let label = ansi_color!(INFO_COLOR, bold = true, "clash resolved:");
    let winner_fmt = ansi_color!(WINNER_COLOR, bold = false, winner);
    let loser_fmt = ansi_color!(LOSER_COLOR, bold = false, loser);
    println!("{label} key '{key}' kept '{winner_fmt}' over '{loser_fmt}'");
}
