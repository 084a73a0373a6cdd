//! Turning raw configuration values into filesystem paths that can be checked.

use std::collections::HashMap;
use std::path::Path;

/// Extensions after which a command line's arguments begin.
const EXECUTABLE_EXTENSIONS: &[&str] = &[
    ".exe", ".dll", ".com", ".bat", ".cmd", ".ocx", ".cpl", ".scr", ".sys", ".msc",
];

/// Environment snapshot used for `%VAR%` expansion. Names are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct Env {
    vars: HashMap<String, String>,
}

impl Env {
    pub fn from_process() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<K: Into<String>, V: Into<String>>(vars: impl IntoIterator<Item = (K, V)>) -> Self {
        Env {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into().to_ascii_uppercase(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(&name.to_ascii_uppercase()).map(String::as_str)
    }

    /// Replace every `%NAME%` with its value. Unknown names are left in place.
    pub fn expand(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        let mut rest = s;
        while let Some(start) = rest.find('%') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            match after.find('%') {
                Some(end) if end > 0 => {
                    let name = &after[..end];
                    match self.get(name) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('%');
                            out.push_str(name);
                            out.push('%');
                        }
                    }
                    rest = &after[end + 1..];
                }
                _ => {
                    out.push('%');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// A plain path value: trimmed, unquoted, expanded.
pub fn clean_path(raw: &str, env: &Env) -> String {
    let s = raw.trim().trim_matches('"');
    env.expand(s).trim().trim_matches('"').to_string()
}

/// The program a command-line value starts, without quotes or arguments.
///
/// `"C:\App\app.exe" --min` and `C:\App\app.exe --min` both yield
/// `C:\App\app.exe`. An unquoted value with spaces and no known executable
/// extension resolves to its longest space-joined prefix that exists on disk,
/// or to an empty string when no prefix does.
pub fn command_path(raw: &str, env: &Env) -> String {
    command_path_with(raw, env, |p| matches!(Path::new(p).try_exists(), Ok(true)))
}

/// [`command_path`] with an explicit existence probe.
pub fn command_path_with(raw: &str, env: &Env, exists: impl Fn(&str) -> bool) -> String {
    let s = raw.trim();
    let program = if let Some(quoted) = s.strip_prefix('"') {
        match quoted.find('"') {
            Some(end) => &quoted[..end],
            None => quoted,
        }
    } else {
        let lower = s.to_ascii_lowercase();
        let cut = EXECUTABLE_EXTENSIONS
            .iter()
            .filter_map(|ext| {
                lower.match_indices(*ext).map(|(i, _)| i + ext.len()).find(|&end| {
                    lower[end..]
                        .chars()
                        .next()
                        .map_or(true, |c| c.is_whitespace() || c == ',')
                })
            })
            .min();
        match cut {
            Some(end) => &s[..end],
            None => return spaced_program(s, env, exists),
        }
    };
    clean_path(program, env)
}

/// Longest whitespace-joined prefix of `s` that exists. A single token is
/// returned as is; otherwise nothing is guessed.
fn spaced_program(s: &str, env: &Env, exists: impl Fn(&str) -> bool) -> String {
    let tokens: Vec<&str> = s.split_whitespace().collect();
    if tokens.len() <= 1 {
        return clean_path(s, env);
    }
    (1..=tokens.len())
        .rev()
        .map(|n| clean_path(&tokens[..n].join(" "), env))
        .find(|candidate| exists(candidate))
        .unwrap_or_default()
}

/// The executable a MuiCache value name refers to: everything up to the
/// last `.exe` (value names look like `C:\App\app.exe.FriendlyAppName`).
pub fn mui_executable(value_name: &str) -> Option<&str> {
    if !value_name.contains('\\') {
        return None;
    }
    let lower = value_name.to_ascii_lowercase();
    lower.rfind(".exe").map(|i| &value_name[..i + 4])
}

/// Whether `path` can be meaningfully tested for existence.
///
/// Rejects empty paths, bare drive roots, relative paths and anything that
/// still holds an unexpanded variable.
pub fn is_checkable(path: &str) -> bool {
    if path.len() <= 3 || path.contains('%') {
        return false;
    }
    is_absolute(path)
}

fn is_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    let drive = bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/');
    drive || path.starts_with("\\\\") || path.starts_with('/')
}

/// Last component of a Windows or POSIX path.
pub fn file_name(path: &str) -> &str {
    path.rsplit(|c: char| c == '\\' || c == '/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Env {
        Env::from_vars([("ProgramFiles", r"C:\Program Files"), ("SystemRoot", r"C:\Windows")])
    }

    #[test]
    fn expands_known_variables_case_insensitively() {
        let env = env();
        assert_eq!(env.expand(r"%PROGRAMFILES%\App"), r"C:\Program Files\App");
        assert_eq!(env.expand(r"%systemroot%\x.dll"), r"C:\Windows\x.dll");
        assert_eq!(env.expand(r"%NOPE%\x"), r"%NOPE%\x");
        assert_eq!(env.expand("100% done"), "100% done");
    }

    #[test]
    fn command_paths_drop_quotes_and_arguments() {
        let env = env();
        assert_eq!(
            command_path(r#""C:\Program Files\App\app.exe" --minimized"#, &env),
            r"C:\Program Files\App\app.exe"
        );
        assert_eq!(
            command_path(r"C:\Program Files\App\app.exe /background", &env),
            r"C:\Program Files\App\app.exe"
        );
        assert_eq!(
            command_path(r"%ProgramFiles%\Tool\tool.EXE -q", &env),
            r"C:\Program Files\Tool\tool.EXE"
        );
        assert_eq!(
            command_path(r"C:\Apps\my.exe.d\run.exe --x", &env),
            r"C:\Apps\my.exe.d\run.exe"
        );
        assert_eq!(command_path(r"C:\bin\thing", &env), r"C:\bin\thing");
        assert_eq!(command_path("", &env), "");
    }

    #[test]
    fn spaced_commands_without_extension_take_longest_existing_prefix() {
        let env = env();
        let on_disk = |p: &str| p == r"C:\Program Files\My Tool\start.vbs" || p == r"C:\bin\thing";
        assert_eq!(
            command_path_with(r"C:\Program Files\My Tool\start.vbs", &env, on_disk),
            r"C:\Program Files\My Tool\start.vbs"
        );
        assert_eq!(
            command_path_with(r"%ProgramFiles%\My Tool\start.vbs /quiet", &env, on_disk),
            r"C:\Program Files\My Tool\start.vbs"
        );
        assert_eq!(command_path_with(r"C:\bin\thing arg", &env, on_disk), r"C:\bin\thing");
        // Nothing exists: unresolvable rather than a truncated guess
        assert_eq!(
            command_path_with(r"C:\Program Files\Gone Tool\run.ps1", &env, |_| false),
            ""
        );
    }

    #[test]
    fn mui_names_cut_at_last_exe() {
        assert_eq!(
            mui_executable(r"C:\Apps\app.exe.FriendlyAppName"),
            Some(r"C:\Apps\app.exe")
        );
        assert_eq!(mui_executable("LangID"), None);
        assert_eq!(mui_executable(r"C:\Apps\readme.txt"), None);
    }

    #[test]
    fn only_absolute_expanded_paths_are_checkable() {
        assert!(is_checkable(r"C:\Program Files\App"));
        assert!(is_checkable(r"\\server\share\app.exe"));
        assert!(!is_checkable(r"C:\"));
        assert!(!is_checkable("app.exe"));
        assert!(!is_checkable(r"%APPDATA%\App"));
        assert!(!is_checkable(""));
    }

    #[test]
    fn file_name_handles_both_separators() {
        assert_eq!(file_name(r"C:\a\b.dll"), "b.dll");
        assert_eq!(file_name("/usr/lib/c.so"), "c.so");
    }
}
