//! Command-line surface.

use std::ffi::OsString;

use clap::Parser;

/// Flags the daemon understands. Any other dashed argument is skipped.
const KNOWN_FLAGS: [&str; 3] = ["--debug", "--help", "-h"];

/// Control-plane daemon that classifies processes into proxy cgroups and
/// programs TPROXY diversion rules.
#[derive(Debug, Clone, Parser)]
#[command(name = "cgproxyd")]
pub struct Cli {
    /// Log at debug level.
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Parses the process arguments, ignoring anything the daemon does not
    /// recognise.
    #[must_use]
    pub fn parse_lenient<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::parse_from(recognised_args(args))
    }
}

/// Keeps the program name and every known flag up to the first positional
/// argument. Unknown flags are dropped and parsing carries on past them.
fn recognised_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut args = args.into_iter().map(Into::into);
    let mut kept: Vec<OsString> = args.next().into_iter().collect();
    for arg in args {
        let flag = arg
            .to_str()
            .filter(|text| text.starts_with('-'))
            .map(|text| KNOWN_FLAGS.contains(&text));
        match flag {
            Some(true) => kept.push(arg),
            Some(false) => {}
            None => break,
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;
    use rstest::rstest;

    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(recognised_args(args.iter().copied()))
    }

    #[rstest]
    #[case(&["cgproxyd"], false)]
    #[case(&["cgproxyd", "--debug"], true)]
    #[case(&["cgproxyd", "--debug", "extra"], true)]
    #[case(&["cgproxyd", "extra", "--debug"], false)]
    #[case(&["cgproxyd", "--foo", "--debug"], true)]
    #[case(&["cgproxyd", "--debug", "--foo"], true)]
    #[case(&["cgproxyd", "-x", "--verbose=3", "--debug"], true)]
    #[case(&["cgproxyd", "--version"], false)]
    #[case(&["cgproxyd", "-V", "--debug"], true)]
    fn debug_flag_counts_until_first_positional(#[case] args: &[&str], #[case] debug: bool) {
        let cli = parse(args).expect("parse");
        assert_eq!(cli.debug, debug);
    }

    #[test]
    fn unknown_flags_are_dropped_before_parsing() {
        let kept = recognised_args(["cgproxyd", "--foo", "--debug", "rest", "--help"]);
        assert_eq!(kept, vec![OsString::from("cgproxyd"), OsString::from("--debug")]);
    }

    #[test]
    fn version_is_not_a_daemon_flag() {
        let error = Cli::try_parse_from(["cgproxyd", "--version"]).expect_err("no version flag");
        assert_eq!(error.kind(), ErrorKind::UnknownArgument);
    }

    #[rstest]
    #[case("--help")]
    #[case("-h")]
    fn help_is_available(#[case] flag: &str) {
        let error = parse(&["cgproxyd", "--foo", flag]).expect_err("help exits");
        assert_eq!(error.kind(), ErrorKind::DisplayHelp);
    }
}
