use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

fn parse_port(args: &[String]) -> Result<u16, String> {
    let mut port = 8080;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-port" => {
                i += 1;
                let value = args.get(i).ok_or("missing value for -port")?;
                port = value
                    .parse()
                    .map_err(|e| format!("invalid -port value {value:?}: {e}"))?;
            }
            other => return Err(format!("unknown flag {other:?}")),
        }
        i += 1;
    }
    Ok(port)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    let port = match parse_port(&args) {
        Ok(port) => port,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("usage: kvserver [-port <port>]");
            std::process::exit(2);
        }
    };

    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!("Starting KVS server on :{port}");
    kvserver::server::run_kv_server(listener, CancellationToken::new()).await
}

#[cfg(test)]
mod tests {
    use super::parse_port;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("kvserver")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn port_defaults_to_8080() {
        assert_eq!(parse_port(&args(&[])).unwrap(), 8080);
    }

    #[test]
    fn port_flag_overrides_default() {
        assert_eq!(parse_port(&args(&["-port", "9001"])).unwrap(), 9001);
    }

    #[test]
    fn malformed_flags_are_rejected() {
        assert!(parse_port(&args(&["-port"])).is_err());
        assert!(parse_port(&args(&["-port", "notaport"])).is_err());
        assert!(parse_port(&args(&["--wat"])).is_err());
    }
}
