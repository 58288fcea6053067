use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Opts {
    /// TTL (hop limit for IPv6) set on outgoing probes
    #[arg(short = 't', long = "ttl", short_alias = 'T', default_value = "64")]
    pub ttl: u32,
    /// Seconds to wait for each reply before counting the probe as lost
    #[arg(short = 'w', long = "timeout", default_value = "1")]
    pub timeout: u64,
    /// Host name or address to probe
    pub target: String,
}

pub const USAGE: &str = "Usage: rtprobe [-w timeout] [-t TTL] address";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_alone_gets_defaults() {
        let opts = Opts::try_parse_from(["rtprobe", "host"]).unwrap();
        assert_eq!(opts.ttl, 64);
        assert_eq!(opts.timeout, 1);
        assert_eq!(opts.target, "host");
    }

    #[test]
    fn ttl_and_timeout_flags() {
        let opts =
            Opts::try_parse_from(["rtprobe", "-t", "12", "-w", "3", "host"])
                .unwrap();
        assert_eq!(opts.ttl, 12);
        assert_eq!(opts.timeout, 3);
    }

    #[test]
    fn uppercase_ttl_alias() {
        let opts =
            Opts::try_parse_from(["rtprobe", "-T", "10", "host"]).unwrap();
        assert_eq!(opts.ttl, 10);
    }

    #[test]
    fn missing_target_is_an_error() {
        assert!(Opts::try_parse_from(["rtprobe"]).is_err());
    }

    #[test]
    fn extra_target_is_an_error() {
        assert!(Opts::try_parse_from(["rtprobe", "one", "two"]).is_err());
    }
}
