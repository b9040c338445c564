use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::dataset::Ccn;

pub fn parse_ccn_list(raw: &[String]) -> Result<Vec<Ccn>> {
    let mut out = Vec::new();
    for piece in raw.iter().flat_map(|entry| entry.split(',')) {
        let trimmed = piece.trim();
        if trimmed.is_empty() {
            continue;
        }
        out.push(
            trimmed
                .parse::<Ccn>()
                .with_context(|| format!("invalid CCN {trimmed:?}"))?,
        );
    }
    Ok(out)
}

/// One identifier per line; blank lines and `#` comments are skipped.
pub fn parse_ccn_file_contents(contents: &str) -> Result<Vec<Ccn>> {
    let mut out = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let entry = line.split('#').next().unwrap_or("").trim();
        if entry.is_empty() {
            continue;
        }
        out.push(
            entry
                .parse::<Ccn>()
                .with_context(|| format!("line {}: invalid CCN {entry:?}", idx + 1))?,
        );
    }
    Ok(out)
}

pub fn load_ccn_file(path: &Path) -> Result<Vec<Ccn>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed reading CCN file: {}", path.display()))?;
    parse_ccn_file_contents(&contents).with_context(|| format!("in {}", path.display()))
}

pub fn resolve_watchlist(ccns: &[String], ccn_file: Option<&Path>) -> Result<Vec<Ccn>> {
    let mut list = parse_ccn_list(ccns)?;
    if let Some(path) = ccn_file {
        list.extend(load_ccn_file(path)?);
    }
    if list.is_empty() {
        return Err(anyhow!("no facilities given; pass --ccn or --ccn-file"));
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_commas_and_normalizes() {
        let parsed = parse_ccn_list(&["455682,675791".to_string(), " 12345 ".to_string()])
            .expect("parse");
        let ids: Vec<&str> = parsed.iter().map(Ccn::as_str).collect();
        assert_eq!(ids, vec!["455682", "675791", "012345"]);
    }

    #[test]
    fn file_skips_blanks_and_comments() {
        let parsed = parse_ccn_file_contents("# watch list\n455682\n\n675791  # new admit\n")
            .expect("parse");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].as_str(), "675791");
    }

    #[test]
    fn bad_line_is_reported_with_number() {
        let err = parse_ccn_file_contents("455682\nnot-a-ccn\n").expect_err("bad line");
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn empty_watchlist_is_rejected() {
        assert!(resolve_watchlist(&[], None).is_err());
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("ccns.txt");
        fs::write(&path, "455682\n").expect("write");
        let list = resolve_watchlist(&["012345".to_string()], Some(&path)).expect("list");
        assert_eq!(list.len(), 2);
    }
}
