// ABOUTME: Resolves the dotted prefix under which coded tools for a network are registered.
// ABOUTME: Explicit path wins, then AGENT_TOOL_PATH, then a coded_tools dir beside the registries.

use std::path::{Component, Path, PathBuf};

/// Environment variable consulted when no explicit tool path is given.
pub const AGENT_TOOL_PATH_ENV: &str = "AGENT_TOOL_PATH";

/// Work out the coded-tool prefix for a network.
///
/// `explicit` and `env` may each be either a dotted prefix (`pkg.coded_tools`)
/// or a filesystem path. When neither is set, `<manifest_dir>/../coded_tools`
/// is used. Filesystem paths are rebased onto the longest matching entry of
/// `search_roots` and turned into a dotted prefix; a path under no search
/// root keeps only its final component.
pub fn determine_agent_tool_path(
    explicit: Option<&str>,
    env: Option<&str>,
    manifest_dir: Option<&Path>,
    search_roots: &[PathBuf],
) -> String {
    let chosen = explicit
        .filter(|s| !s.is_empty())
        .or(env.filter(|s| !s.is_empty()));

    let path = match chosen {
        Some(value) if !looks_like_path(value) => return value.to_string(),
        Some(value) => PathBuf::from(value),
        None => match manifest_dir {
            Some(dir) => dir.join("..").join("coded_tools"),
            None => return "coded_tools".to_string(),
        },
    };

    dotted_from_path(&normalize(&path), search_roots)
}

fn looks_like_path(value: &str) -> bool {
    value.contains('/') || value.contains(std::path::MAIN_SEPARATOR)
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn dotted_from_path(path: &Path, search_roots: &[PathBuf]) -> String {
    let best = search_roots
        .iter()
        .map(|root| normalize(root))
        .filter(|root| path.starts_with(root))
        .max_by_key(|root| root.components().count());

    let relative = match &best {
        Some(root) => path.strip_prefix(root).unwrap_or(path).to_path_buf(),
        None => path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| path.to_path_buf()),
    };

    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dotted_prefix_wins() {
        let path = determine_agent_tool_path(
            Some("my.tools"),
            Some("env.tools"),
            Some(Path::new("/srv/app/registries")),
            &[],
        );
        assert_eq!(path, "my.tools");
    }

    #[test]
    fn env_used_when_no_explicit() {
        let path = determine_agent_tool_path(None, Some("env.tools"), None, &[]);
        assert_eq!(path, "env.tools");
    }

    #[test]
    fn defaults_beside_registries_and_rebases() {
        let roots = vec![PathBuf::from("/srv"), PathBuf::from("/srv/app")];
        let path = determine_agent_tool_path(None, None, Some(Path::new("/srv/app/registries")), &roots);
        assert_eq!(path, "coded_tools");
    }

    #[test]
    fn filesystem_path_is_rebased_onto_longest_root() {
        let roots = vec![PathBuf::from("/srv")];
        let path = determine_agent_tool_path(Some("/srv/app/coded_tools"), None, None, &roots);
        assert_eq!(path, "app.coded_tools");
    }

    #[test]
    fn unmatched_path_keeps_last_component() {
        let path = determine_agent_tool_path(Some("/opt/x/tools"), None, None, &[]);
        assert_eq!(path, "tools");
    }
}
