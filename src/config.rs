use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use clap::Parser;

pub const DEFAULT_THREAD_COUNT: usize = 4;

#[derive(Parser, Debug)]
#[command(name = "httpserver", version, about = "Serves GET, PUT and APPEND on files in a directory")]
pub struct Arguments {
    /// Number of worker threads
    #[arg(short, long, default_value_t = DEFAULT_THREAD_COUNT, value_parser = parse_thread_count)]
    pub threads: usize,

    /// Audit log destination (standard error when omitted)
    #[arg(short, long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Directory whose files are served
    #[arg(short = 'd', long, default_value = ".")]
    pub root: PathBuf,

    /// Port to listen on
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    Stderr,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub threads: usize,
    pub log: LogDestination,
    pub root: PathBuf,
}

impl From<Arguments> for ServerConfig {
    fn from(args: Arguments) -> ServerConfig {
        ServerConfig {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port)),
            threads: args.threads,
            log: args
                .log_file
                .map_or(LogDestination::Stderr, LogDestination::File),
            root: args.root,
        }
    }
}

fn parse_thread_count(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) | Err(_) => Err(format!("bad number of threads: {value}")),
        Ok(count) => Ok(count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::from(Arguments::try_parse_from(["httpserver", "8080"]).unwrap());
        assert_eq!(config.threads, DEFAULT_THREAD_COUNT);
        assert_eq!(config.log, LogDestination::Stderr);
        assert_eq!(config.root, PathBuf::from("."));
        assert_eq!(config.addr.port(), 8080);
    }

    #[test]
    fn all_options() {
        let args = Arguments::try_parse_from([
            "httpserver", "-t", "8", "-l", "audit.log", "-d", "/srv", "1234",
        ])
        .unwrap();
        let config = ServerConfig::from(args);
        assert_eq!(config.threads, 8);
        assert_eq!(config.log, LogDestination::File("audit.log".into()));
        assert_eq!(config.root, PathBuf::from("/srv"));
        assert_eq!(config.addr.port(), 1234);
    }

    #[test]
    fn rejects_bad_values() {
        let cases: [&[&str]; 6] = [
            &["httpserver"],
            &["httpserver", "0"],
            &["httpserver", "65536"],
            &["httpserver", "port"],
            &["httpserver", "-t", "0", "80"],
            &["httpserver", "-t", "-2", "80"],
        ];
        for argv in cases {
            assert!(Arguments::try_parse_from(argv.iter().copied()).is_err(), "{argv:?}");
        }
    }
}
