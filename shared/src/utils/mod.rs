//! Utility functions and helpers

pub mod time;

use std::ffi::OsStr;

/// Render a command line for logs, quoting arguments that contain whitespace
pub fn command_line<I, S>(program: &OsStr, args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    std::iter::once(program)
        .map(quote)
        .chain(args.into_iter().map(|a| quote(a.as_ref())))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote(arg: &OsStr) -> String {
    let s = arg.to_string_lossy();
    if s.is_empty() || s.chars().any(char::is_whitespace) {
        format!("'{}'", s.replace('\'', r"'\''"))
    } else {
        s.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let line = command_line(OsStr::new("perf"), ["record", "-p", "42", "--", "sleep", "5"]);
        assert_eq!(line, "perf record -p 42 -- sleep 5");
    }

    #[test]
    fn test_command_line_quotes_whitespace() {
        let line = command_line(OsStr::new("/opt/my perf/perf"), ["report", ""]);
        assert_eq!(line, "'/opt/my perf/perf' report ''");
    }
}
