use super::{EXIT_CHECK, expect_paths, load_chunk};
use crate::args::CliArgs;

pub(crate) fn run(args: &CliArgs) -> i32 {
    if let Err(code) = expect_paths(args, 1, "<chunk>") {
        return code;
    }
    let path = args.positional[0].as_str();
    let loaded = match load_chunk(path) {
        Ok(l) => l,
        Err(code) => return code,
    };
    let again = luma_runtime::dump_to_vec(&loaded.rt, loaded.main, false);
    if let Some(at) = first_difference(&loaded.bytes, &again) {
        eprintln!(
            "{path}: re-dump differs at byte {at} ({} bytes read, {} bytes written)",
            loaded.bytes.len(),
            again.len()
        );
        return EXIT_CHECK;
    }
    println!(
        "{path}: ok ({} bytes, {} templates)",
        again.len(),
        loaded.templates().len()
    );
    0
}

fn first_difference(a: &[u8], b: &[u8]) -> Option<usize> {
    match a.iter().zip(b).position(|(x, y)| x != y) {
        Some(i) => Some(i),
        None if a.len() != b.len() => Some(a.len().min(b.len())),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::first_difference;

    #[test]
    fn reports_first_mismatch_or_length_change() {
        assert_eq!(first_difference(b"abc", b"abc"), None);
        assert_eq!(first_difference(b"abc", b"abd"), Some(2));
        assert_eq!(first_difference(b"abc", b"abcd"), Some(3));
    }
}
