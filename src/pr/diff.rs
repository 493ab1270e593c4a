use super::types::FileChange;
use crate::github::GitHubError;

/// Parse a unified diff, as served by GitHub's diff media type, into one
/// `FileChange` per file section.
///
/// Each file section starts with:
///   diff --git a/{path} b/{path}
///
/// Renames carry `rename from` / `rename to` lines and are reported under the
/// new path. New files have `--- /dev/null`, deleted files `+++ /dev/null`
/// and are reported under their old path.
///
/// Hunks start with: @@ -{old_start},{old_count} +{new_start},{new_count} @@
/// and their bodies are consumed by those counts, so a removed line that
/// itself starts with `--` is still counted as a deletion.
pub fn parse_diff(raw_diff: &str) -> Result<Vec<FileChange>, GitHubError> {
    let mut files = Vec::new();
    let mut current: Option<FileSection> = None;
    let mut hunk: Option<HunkBudget> = None;

    for line in raw_diff.lines() {
        if let Some(budget) = hunk.as_mut() {
            if let Some(section) = current.as_mut() {
                if budget.consume(line, section) {
                    if budget.is_spent() {
                        hunk = None;
                    }
                    continue;
                }
            }
            // Short hunk: fall through and treat the line as a header.
            hunk = None;
        }

        if let Some(rest) = line.strip_prefix("diff --git ") {
            if let Some(section) = current.take() {
                files.push(section.finish());
            }
            current = Some(FileSection::new(parse_git_header(rest)));
            continue;
        }

        if line.starts_with("@@") {
            let section = current.as_mut().ok_or_else(|| {
                GitHubError::DiffParse("Hunk found before any file header".to_string())
            })?;
            let (_, old_count, _, new_count) = parse_hunk_header(line)?;
            section.has_hunks = true;
            hunk = Some(HunkBudget {
                old_left: old_count,
                new_left: new_count,
            })
            .filter(|budget| !budget.is_spent());
            continue;
        }

        if let Some(rest) = line.strip_prefix("--- ") {
            // Plain unified diffs have no `diff --git` line between files.
            if current.as_ref().map_or(true, |section| section.has_hunks) {
                if let Some(section) = current.take() {
                    files.push(section.finish());
                }
                current = Some(FileSection::new(None));
            }
            if let Some(section) = current.as_mut() {
                section.source = Some(marker_path(rest));
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("+++ ") {
            if let Some(section) = current.as_mut() {
                section.target = Some(marker_path(rest));
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("rename to ") {
            if let Some(section) = current.as_mut() {
                section.rename_to = Some(unquote(rest.trim()));
            }
            continue;
        }

        // index, mode, similarity, rename from, Binary files ..., \ No newline
    }

    if let Some(section) = current.take() {
        files.push(section.finish());
    }
    Ok(files)
}

/// Path named on a `---` / `+++` line; `None` stands for /dev/null.
type MarkerPath = Option<String>;

struct FileSection {
    header_path: Option<String>,
    source: Option<MarkerPath>,
    target: Option<MarkerPath>,
    rename_to: Option<String>,
    has_hunks: bool,
    additions: u64,
    deletions: u64,
}

impl FileSection {
    fn new(header_path: Option<String>) -> Self {
        Self {
            header_path,
            source: None,
            target: None,
            rename_to: None,
            has_hunks: false,
            additions: 0,
            deletions: 0,
        }
    }

    fn finish(self) -> FileChange {
        let path = self
            .target
            .flatten()
            .or(self.rename_to)
            .or(self.header_path)
            .or(self.source.flatten())
            .unwrap_or_default();

        FileChange {
            path,
            additions: self.additions,
            deletions: self.deletions,
        }
    }
}

struct HunkBudget {
    old_left: usize,
    new_left: usize,
}

impl HunkBudget {
    /// Counts `line` against the hunk; false if it cannot belong to it.
    fn consume(&mut self, line: &str, section: &mut FileSection) -> bool {
        match line.as_bytes().first().copied() {
            Some(b'+') if self.new_left > 0 => {
                self.new_left -= 1;
                section.additions += 1;
            }
            Some(b'-') if self.old_left > 0 => {
                self.old_left -= 1;
                section.deletions += 1;
            }
            // Some tools strip the single space off blank context lines.
            Some(b' ') | None if self.old_left > 0 && self.new_left > 0 => {
                self.old_left -= 1;
                self.new_left -= 1;
            }
            Some(b'\\') => {}
            _ => return false,
        }
        true
    }

    fn is_spent(&self) -> bool {
        self.old_left == 0 && self.new_left == 0
    }
}

/// Path of the `b/` side of a `diff --git a/... b/...` header.
fn parse_git_header(rest: &str) -> Option<String> {
    let rest = rest.trim_end();

    if rest.starts_with('"') || rest.ends_with('"') {
        let (_, target) = split_quoted_pair(rest)?;
        return Some(strip_side_prefix(&target).to_string());
    }

    // Unquoted paths may contain spaces; both sides are equal unless the
    // file was renamed, in which case `rename to` supplies the path.
    let middle = rest.len() / 2;
    if rest.len() % 2 == 1 {
        if let (Some(left), Some(right)) = (rest.get(..middle), rest.get(middle + 1..)) {
            if let (Some(a), Some(b)) = (left.strip_prefix("a/"), right.strip_prefix("b/")) {
                if a == b {
                    return Some(b.to_string());
                }
            }
        }
    }

    rest.rfind(" b/").map(|index| rest[index + 3..].to_string())
}

/// Splits `"a/x y" "b/x y"` (either side may be unquoted) into its halves.
fn split_quoted_pair(rest: &str) -> Option<(String, String)> {
    let (first, remainder) = take_token(rest)?;
    let (second, _) = take_token(remainder.trim_start())?;
    Some((first, second))
}

fn take_token(input: &str) -> Option<(String, &str)> {
    if let Some(quoted) = input.strip_prefix('"') {
        let mut escaped = false;
        for (index, ch) in quoted.char_indices() {
            match ch {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => {
                    let token = unquote(&input[..index + 2]);
                    return Some((token, &quoted[index + 1..]));
                }
                _ => escaped = false,
            }
        }
        None
    } else {
        let end = input.find(' ').unwrap_or(input.len());
        Some((input[..end].to_string(), &input[end..]))
    }
}

fn marker_path(rest: &str) -> MarkerPath {
    // Some producers append a tab and a timestamp.
    let raw = rest.split('\t').next().unwrap_or(rest).trim_end();
    let path = unquote(raw);
    if path == "/dev/null" {
        return None;
    }
    Some(strip_side_prefix(&path).to_string())
}

fn strip_side_prefix(path: &str) -> &str {
    path.strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path)
}

/// Removes surrounding double quotes and resolves git's C-style escapes,
/// including octal-escaped UTF-8 bytes.
fn unquote(path: &str) -> String {
    let Some(inner) = path.strip_prefix('"').and_then(|p| p.strip_suffix('"')) else {
        return path.trim_matches('"').to_string();
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => bytes.push(b'\n'),
            Some('t') => bytes.push(b'\t'),
            Some(digit @ '0'..='7') => {
                let mut value = digit.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(next) => {
                            value = value * 8 + next;
                            chars.next();
                        }
                        None => break,
                    }
                }
                bytes.push(value as u8);
            }
            Some(other) => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => bytes.push(b'\\'),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn parse_hunk_header(line: &str) -> Result<(usize, usize, usize, usize), GitHubError> {
    let header = line
        .trim()
        .strip_prefix("@@")
        .ok_or_else(|| GitHubError::DiffParse("Invalid hunk header".to_string()))?
        .trim();
    // Drop the trailing `@@` and any function context after it.
    let header = header.split("@@").next().unwrap_or(header).trim();
    let mut parts = header.split_whitespace();
    let old_part = parts
        .next()
        .ok_or_else(|| GitHubError::DiffParse(format!("Missing old range in {}", line)))?;
    let new_part = parts
        .next()
        .ok_or_else(|| GitHubError::DiffParse(format!("Missing new range in {}", line)))?;

    let (old_start, old_count) = parse_range(old_part, '-')?;
    let (new_start, new_count) = parse_range(new_part, '+')?;

    Ok((old_start, old_count, new_start, new_count))
}

fn parse_range(part: &str, prefix: char) -> Result<(usize, usize), GitHubError> {
    let range = part
        .strip_prefix(prefix)
        .ok_or_else(|| GitHubError::DiffParse(format!("Invalid range prefix in {}", part)))?;
    let (start_str, count_str) = match range.split_once(',') {
        Some((start, count)) => (start, count),
        None => (range, "1"),
    };
    let start = start_str
        .parse::<usize>()
        .map_err(|_| GitHubError::DiffParse(format!("Invalid range start in {}", part)))?;
    let count = count_str
        .parse::<usize>()
        .map_err(|_| GitHubError::DiffParse(format!("Invalid range count in {}", part)))?;
    Ok((start, count))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_DIFF: &str = r#"diff --git a/src/main.rs b/src/main.rs
index abc1234..def5678 100644
--- a/src/main.rs
+++ b/src/main.rs
@@ -1,3 +1,4 @@
 fn main() {
-    println!("old");
+    println!("new");
+    // Added a comment
 }
"#;

    fn change(path: &str, additions: u64, deletions: u64) -> FileChange {
        FileChange {
            path: path.to_string(),
            additions,
            deletions,
        }
    }

    #[test]
    fn test_parse_single_file_diff() {
        let files = parse_diff(SAMPLE_DIFF).unwrap();
        assert_eq!(files, vec![change("src/main.rs", 2, 1)]);
    }

    #[test]
    fn test_parse_new_file_diff() {
        let diff = r#"diff --git a/new_file.txt b/new_file.txt
new file mode 100644
index 0000000..e69de29
--- /dev/null
+++ b/new_file.txt
@@ -0,0 +1,2 @@
+hello
+world
"#;
        assert_eq!(parse_diff(diff).unwrap(), vec![change("new_file.txt", 2, 0)]);
    }

    #[test]
    fn test_parse_deleted_file_diff() {
        let diff = r#"diff --git a/old_file.txt b/old_file.txt
deleted file mode 100644
index e69de29..0000000
--- a/old_file.txt
+++ /dev/null
@@ -1,2 +0,0 @@
-hello
-world
"#;
        assert_eq!(parse_diff(diff).unwrap(), vec![change("old_file.txt", 0, 2)]);
    }

    #[test]
    fn test_parse_empty_diff() {
        assert!(parse_diff("").unwrap().is_empty());
    }

    #[test]
    fn test_pure_rename_uses_new_path() {
        let diff = r#"diff --git a/docs/old.md b/docs/new.md
similarity index 100%
rename from docs/old.md
rename to docs/new.md
"#;
        assert_eq!(parse_diff(diff).unwrap(), vec![change("docs/new.md", 0, 0)]);
    }

    #[test]
    fn test_rename_with_edits_uses_new_path() {
        let diff = r#"diff --git a/lib/a.py b/lib/b.py
similarity index 90%
rename from lib/a.py
rename to lib/b.py
index 1111111..2222222 100644
--- a/lib/a.py
+++ b/lib/b.py
@@ -1,2 +1,2 @@
-x = 1
+x = 2
 y = 3
"#;
        assert_eq!(parse_diff(diff).unwrap(), vec![change("lib/b.py", 1, 1)]);
    }

    #[test]
    fn test_multiple_files_keep_order() {
        let diff = format!(
            "{SAMPLE_DIFF}diff --git a/README.md b/README.md\n--- a/README.md\n+++ b/README.md\n@@ -1 +1 @@\n-a\n+b\n"
        );
        let files = parse_diff(&diff).unwrap();
        assert_eq!(
            files,
            vec![change("src/main.rs", 2, 1), change("README.md", 1, 1)]
        );
    }

    #[test]
    fn test_dashed_content_lines_are_counted() {
        let diff = r#"diff --git a/notes.md b/notes.md
--- a/notes.md
+++ b/notes.md
@@ -1,2 +1,2 @@
--- a horizontal rule
+++ bold plus
 tail
"#;
        assert_eq!(parse_diff(diff).unwrap(), vec![change("notes.md", 1, 1)]);
    }

    #[test]
    fn test_no_newline_marker_is_ignored() {
        let diff = r#"diff --git a/a.txt b/a.txt
--- a/a.txt
+++ b/a.txt
@@ -1 +1 @@
-old
\ No newline at end of file
+new
\ No newline at end of file
"#;
        assert_eq!(parse_diff(diff).unwrap(), vec![change("a.txt", 1, 1)]);
    }

    #[test]
    fn test_quoted_path_with_spaces() {
        let diff = r#"diff --git "a/my dir/file \"x\".txt" "b/my dir/file \"x\".txt"
--- "a/my dir/file \"x\".txt"
+++ "b/my dir/file \"x\".txt"
@@ -0,0 +1 @@
+hi
"#;
        assert_eq!(
            parse_diff(diff).unwrap(),
            vec![change("my dir/file \"x\".txt", 1, 0)]
        );
    }

    #[test]
    fn test_unquoted_path_with_spaces_in_binary_diff() {
        let diff = "diff --git a/img/a b.png b/img/a b.png\nindex 1..2 100644\nBinary files a/img/a b.png and b/img/a b.png differ\n";
        assert_eq!(parse_diff(diff).unwrap(), vec![change("img/a b.png", 0, 0)]);
    }

    #[test]
    fn test_octal_escaped_path() {
        let diff = "diff --git \"a/caf\\303\\251.txt\" \"b/caf\\303\\251.txt\"\n--- \"a/caf\\303\\251.txt\"\n+++ \"b/caf\\303\\251.txt\"\n@@ -1 +1 @@\n-a\n+b\n";
        assert_eq!(parse_diff(diff).unwrap(), vec![change("café.txt", 1, 1)]);
    }

    #[test]
    fn test_invalid_hunk_header_is_an_error() {
        let diff = "diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -a,b +c,d @@\n+x\n";
        assert!(matches!(parse_diff(diff), Err(GitHubError::DiffParse(_))));
    }

    #[test]
    fn test_hunk_without_file_is_an_error() {
        assert!(matches!(
            parse_diff("@@ -1 +1 @@\n-a\n+b\n"),
            Err(GitHubError::DiffParse(_))
        ));
    }

    #[test]
    fn test_hunk_header_with_function_context() {
        let (old_start, old_count, new_start, new_count) =
            parse_hunk_header("@@ -10,4 +12,6 @@ fn main() {").unwrap();
        assert_eq!((old_start, old_count, new_start, new_count), (10, 4, 12, 6));
    }
}
