use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{App, Arg, ErrorKind};
use client::proto::magnet::MagnetUri;
use magnet2torrent::{
    metadata::Progress, output, Acquisition, Config, Error, OverwritePolicy,
};
use tokio::sync::watch;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let m = match app().get_matches_safe() {
        Ok(m) => m,
        Err(e) if e.kind == ErrorKind::HelpDisplayed || e.kind == ErrorKind::VersionDisplayed => {
            e.exit()
        }
        Err(e) => {
            eprintln!("{}", e.message);
            process::exit(2);
        }
    };

    let code = match run(&m).await {
        Ok(path) => {
            println!("Torrent file has been created: {}", path.display());
            0
        }
        Err(e) => {
            debug!("{:?}", e);
            match &e {
                Error::Timeout { .. } => eprintln!("Metadata downloading timed out!"),
                Error::InvalidMagnetUri(_)
                | Error::InvalidArgument(_)
                | Error::InvalidOutputDir(_) => eprintln!("{}", e),
                _ => eprintln!("Unable to retrieve torrent information! {}", e),
            }
            e.exit_code()
        }
    };
    process::exit(code);
}

fn app() -> App<'static, 'static> {
    App::new("magnet2torrent")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Convert a magnet link into a .torrent file")
        .arg(
            Arg::with_name("magnet")
                .help("The magnet link")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("output")
                .help("Directory to write the .torrent file to")
                .short("o")
                .long("output")
                .takes_value(true)
                .default_value("."),
        )
        .arg(
            Arg::with_name("timeout")
                .help("Seconds to wait for the metadata")
                .short("t")
                .long("timeout")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("connections")
                .help("Maximum number of concurrent peer connections")
                .short("c")
                .long("connections")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("on-conflict")
                .help("What to do when the .torrent file already exists")
                .long("on-conflict")
                .takes_value(true)
                .possible_values(OverwritePolicy::VALUES),
        )
        .arg(
            Arg::with_name("no-dht")
                .help("Only use the trackers and peers named in the magnet link")
                .long("no-dht"),
        )
}

async fn run(m: &clap::ArgMatches<'_>) -> Result<PathBuf, Error> {
    let config = config_from(m)?;
    let dir = Path::new(m.value_of("output").unwrap_or("."));
    output::check_output_dir(dir)?;

    let uri = m.value_of("magnet").unwrap_or_default();
    let magnet = MagnetUri::parse_lenient(uri)?;

    eprintln!("Downloading metadata...");
    let acquisition = Acquisition::new(&magnet, config);
    let progress = acquisition.progress();
    let (result, _) = futures::join!(acquisition.save(dir), print_progress(progress));
    result
}

fn config_from(m: &clap::ArgMatches<'_>) -> Result<Config, Error> {
    let mut config = Config::default();

    if let Some(t) = m.value_of("timeout") {
        let secs: f64 = t
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("Invalid timeout: {}", t)))?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(Error::InvalidArgument(format!("Invalid timeout: {}", t)));
        }
        config.timeout = Duration::from_secs_f64(secs);
    }

    if let Some(c) = m.value_of("connections") {
        config.max_connections = match c.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => return Err(Error::InvalidArgument(format!("Invalid connection count: {}", c))),
        };
    }

    if let Some(p) = m.value_of("on-conflict") {
        config.on_conflict = p.parse()?;
    }

    if m.is_present("no-dht") {
        config.dht_routers.clear();
    }

    Ok(config)
}

/// Keep one progress line on stderr up to date until the acquisition ends.
async fn print_progress(mut progress: watch::Receiver<Progress>) {
    while progress.changed().await.is_ok() {
        let line = progress.borrow().to_string();
        eprint!("\r\x1b[2K{}", line);
    }
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(args: &[&str]) -> Result<Config, Error> {
        let mut argv = vec!["magnet2torrent", "magnet:?xt=urn:btih:dbef5dea789992fc174f245e1c4df4a1ef34d1f1"];
        argv.extend_from_slice(args);
        config_from(&app().get_matches_from_safe(argv).unwrap())
    }

    #[test]
    fn timeout_values() {
        assert_eq!(Duration::ZERO, config(&["-t", "0"]).unwrap().timeout);
        assert_eq!(Duration::from_millis(2500), config(&["--timeout", "2.5"]).unwrap().timeout);
        assert_eq!(Duration::from_secs(120), config(&[]).unwrap().timeout);
        assert!(matches!(config(&["-t", "soon"]), Err(Error::InvalidArgument(_))));
        assert!(matches!(config(&["-t", "inf"]), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn connections_and_conflicts() {
        let c = config(&["-c", "5", "--on-conflict", "rename"]).unwrap();
        assert_eq!(5, c.max_connections);
        assert_eq!(OverwritePolicy::Rename, c.on_conflict);
        assert!(matches!(config(&["-c", "0"]), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn dht_switch() {
        assert!(!config(&[]).unwrap().dht_routers.is_empty());
        assert!(config(&["--no-dht"]).unwrap().dht_routers.is_empty());
    }
}
