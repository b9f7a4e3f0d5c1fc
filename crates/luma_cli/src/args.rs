pub(crate) struct CliArgs {
    pub cmd: String,
    pub json_out: bool,
    pub positional: Vec<String>,
}

pub(crate) fn usage() -> &'static str {
    "Usage: luma <inspect|strip|verify> [json] <args>\n\
     \n\
     \x20 inspect [json] <chunk>   list the templates of a precompiled chunk\n\
     \x20 strip <in> <out>         rewrite a chunk without debug information\n\
     \x20 verify <chunk>           check that a chunk reloads and re-dumps byte for byte"
}

pub(crate) fn parse_args(argv: impl IntoIterator<Item = String>) -> Result<CliArgs, String> {
    let mut argv = argv.into_iter();
    let cmd = argv.next().ok_or_else(|| usage().to_string())?;

    let mut json_out = false;
    let mut positional: Vec<String> = Vec::new();
    for a in argv {
        if a.starts_with("--") {
            return Err(format!("Unknown option: {a}"));
        }
        if a == "json" && positional.is_empty() {
            json_out = true;
        } else {
            positional.push(a);
        }
    }

    Ok(CliArgs {
        cmd,
        json_out,
        positional,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs, String> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn json_flag_only_before_paths() {
        let a = parse(&["inspect", "json", "x.luac"]).unwrap();
        assert!(a.json_out);
        assert_eq!(a.positional, vec!["x.luac"]);
        let b = parse(&["strip", "in", "json"]).unwrap();
        assert!(!b.json_out);
        assert_eq!(b.positional, vec!["in", "json"]);
    }

    #[test]
    fn dashed_options_are_rejected() {
        assert!(parse(&["verify", "--fast", "x"]).is_err());
        assert!(parse(&[]).is_err());
    }
}
