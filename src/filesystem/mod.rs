//! Remote file access for the file browser: `ls` listings and SCP copies.

pub mod listing;
pub mod scp;

pub use listing::{FileEntry, parse_ls_output, shell_quote};

/// Joins a remote directory and an entry name with `/`.
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/", "etc"), "/etc");
        assert_eq!(join_remote("/home/alice", "notes.txt"), "/home/alice/notes.txt");
        assert_eq!(join_remote("", "x"), "x");
    }
}
