//! lock client configs

pub mod cli {
    //! Parse from either cli or env var

    /// Default lock service address
    pub static DEFAULT_BASE_URL: &str = crate::http::DEFAULT_BASE_URL;
    /// Default heartbeat interval in seconds
    pub const DEFAULT_INTERVAL: u64 = 10;
    /// Default per-request timeout in seconds
    pub const DEFAULT_REQUEST_TIMEOUT: u64 = 10;
    /// Default acquisition attempts, `unlimited` or `-1` retries forever
    pub static DEFAULT_RETRIES: &str = "1";
    /// tokio worker thread name
    pub static DEFAULT_THREAD_NAME: &str = "leasehold-worker";
    /// default log level. Can use this argument or LEASEHOLD_LOG env var
    pub const DEFAULT_LEASEHOLD_LOG: &str = "info";

    use std::{net::SocketAddr, time::Duration};

    pub use clap::Parser;
    use clap::Subcommand;

    use super::trace::LogFormat;
    use crate::retry::RetryPolicy;

    #[derive(Parser, Debug, Clone, PartialEq, Eq)]
    #[clap(author, name = "leasehold", bin_name = "leasehold", about, long_about = None)]
    /// parses from cli & environment var. leasehold will load `.env` in the working dir as well
    pub struct Config {
        /// base url of the lock service
        #[clap(long, env = "LEASEHOLD_BASE_URL", value_parser, default_value = DEFAULT_BASE_URL)]
        pub base_url: String,
        /// seconds between lease renewals, and between conflicting attempts
        #[clap(long, env = "LEASEHOLD_INTERVAL", value_parser, default_value_t = DEFAULT_INTERVAL)]
        pub interval: u64,
        /// per-request timeout in seconds
        #[clap(long, env = "LEASEHOLD_REQUEST_TIMEOUT", value_parser, default_value_t = DEFAULT_REQUEST_TIMEOUT)]
        pub request_timeout: u64,
        /// acquisition attempts while the lock is held elsewhere (>= 1), `unlimited` or `-1` to never give up
        #[clap(long, env = "LEASEHOLD_RETRIES", value_parser, allow_hyphen_values = true, default_value = DEFAULT_RETRIES)]
        pub retries: RetryPolicy,
        /// Worker thread name
        #[clap(long, env = "LEASEHOLD_THREAD_NAME", value_parser, default_value = DEFAULT_THREAD_NAME)]
        pub thread_name: String,
        /// number of worker threads [default: # of logical CPUs]
        #[clap(long, env = "LEASEHOLD_THREADS", value_parser)]
        pub threads: Option<usize>,
        /// set the log level. All valid RUST_LOG arguments are accepted
        #[clap(long, env = "LEASEHOLD_LOG", value_parser, default_value = DEFAULT_LEASEHOLD_LOG)]
        pub leasehold_log: String,
        /// log output format
        #[clap(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Standard)]
        pub log_format: LogFormat,
        /// serve prometheus metrics in text format on this address, at `/metrics`
        #[clap(long, env = "LEASEHOLD_METRICS_ADDR", value_parser)]
        pub metrics_addr: Option<SocketAddr>,
        #[clap(subcommand)]
        pub command: Command,
    }

    /// what to do once configured
    #[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
    pub enum Command {
        /// take a lock and hold it while doing work
        Lock {
            /// name of the lock resource
            name: String,
            /// seconds of work to do while holding the lock [default: until ctrl-c]
            #[clap(long, value_parser)]
            hold: Option<u64>,
        },
        /// run a leader election on a lock
        Elect {
            /// name of the lock resource
            name: String,
            /// seconds the leader leads for [default: until ctrl-c]
            #[clap(long, value_parser)]
            hold: Option<u64>,
        },
    }

    impl Config {
        /// heartbeat interval as `Duration`
        pub fn interval(&self) -> Duration {
            Duration::from_secs(self.interval)
        }

        /// request timeout as `Duration`
        pub fn request_timeout(&self) -> Duration {
            Duration::from_secs(self.request_timeout)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let cfg = Config::try_parse_from(["leasehold", "lock", "db-migrate"]).unwrap();
            assert_eq!(cfg.base_url, "http://localhost:8080");
            assert_eq!(cfg.interval(), Duration::from_secs(10));
            assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
            assert_eq!(cfg.retries, RetryPolicy::ONCE);
            assert_eq!(cfg.log_format, LogFormat::Standard);
            assert_eq!(cfg.metrics_addr, None);
            assert_eq!(
                cfg.command,
                Command::Lock {
                    name: "db-migrate".into(),
                    hold: None
                }
            );
        }

        #[test]
        fn test_flags() {
            let cfg = Config::try_parse_from([
                "leasehold",
                "--base-url",
                "http://sidecar:13131/",
                "--interval",
                "2",
                "--retries",
                "unlimited",
                "--log-format",
                "json",
                "--metrics-addr",
                "127.0.0.1:9100",
                "elect",
                "leader",
                "--hold",
                "45",
            ])
            .unwrap();
            assert_eq!(cfg.base_url, "http://sidecar:13131/");
            assert_eq!(cfg.interval(), Duration::from_secs(2));
            assert_eq!(cfg.retries, RetryPolicy::Unlimited);
            assert_eq!(cfg.log_format, LogFormat::Json);
            assert_eq!(cfg.metrics_addr, Some("127.0.0.1:9100".parse().unwrap()));
            assert_eq!(
                cfg.command,
                Command::Elect {
                    name: "leader".into(),
                    hold: Some(45)
                }
            );
        }

        #[test]
        fn test_bad_retries_rejected() {
            let res = Config::try_parse_from(["leasehold", "--retries", "many", "lock", "x"]);
            assert!(res.is_err());
            let res = Config::try_parse_from(["leasehold", "--retries", "0", "lock", "x"]);
            assert!(res.is_err());
        }

        #[test]
        fn test_negative_one_retries_forever() {
            let cfg = Config::try_parse_from(["leasehold", "--retries", "-1", "lock", "x"]).unwrap();
            assert_eq!(cfg.retries, RetryPolicy::Unlimited);
        }
    }
}

pub mod trace {
    //! tracing configuration
    use anyhow::Result;
    use clap::ValueEnum;
    use tracing_subscriber::{
        filter::EnvFilter,
        fmt::{
            self,
            format::{Format, PrettyFields},
        },
        prelude::__tracing_subscriber_SubscriberExt,
        util::SubscriberInitExt,
    };

    /// Log output format
    #[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub enum LogFormat {
        /// unstructured lines
        #[default]
        Standard,
        /// one json object per event
        Json,
        /// multi-line, human readable
        Pretty,
    }

    /// Install the global subscriber. `level` takes RUST_LOG syntax and falls
    /// back to `info` if it doesn't parse.
    pub fn init(level: &str, format: LogFormat) -> Result<()> {
        let filter = EnvFilter::try_new(level)
            .or_else(|_| EnvFilter::try_new("info"))?
            .add_directive("hyper=off".parse()?)
            .add_directive("reqwest=warn".parse()?);
        let registry = tracing_subscriber::registry().with(filter);

        match format {
            LogFormat::Json => registry.with(fmt::layer().json()).try_init()?,
            LogFormat::Pretty => registry
                .with(
                    fmt::layer()
                        .event_format(Format::default().pretty().with_source_location(false))
                        .fmt_fields(PrettyFields::new()),
                )
                .try_init()?,
            LogFormat::Standard => registry.with(fmt::layer()).try_init()?,
        }
        Ok(())
    }
}
