//! Server configuration and the accept loop.
//!
//! Parses host/port from the command line, spawns the process-wide directory
//! before any connection is accepted, and hands each accepted stream to its
//! own connection task.

use std::io;
use std::net::SocketAddr;

use regex::Regex;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::connection::handle_connection;
use crate::directory::{self, DirectoryHandle};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u32 = 7379;

/// Errors that can occur during command-line argument parsing.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum CliError {
    #[error("Invalid command line flag")]
    InvalidCommandLineFlag,
    #[error("Invalid port flag value")]
    InvalidPortFlagValue,
    #[error("Invalid host flag value")]
    InvalidHostFlagValue,
}

/// Network configuration for a server instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u32,
}

impl ServerConfig {
    /// Builds a configuration from command-line arguments.
    ///
    /// # Supported Arguments
    ///
    /// * `--host <addr>` - IPv4 address or hostname to bind (default: 127.0.0.1)
    /// * `--port <port>` - Port number to listen on (default: 7379)
    pub fn new<I: IntoIterator<Item = String>>(command_line_args: I) -> Result<Self, CliError> {
        let mut iter = command_line_args.into_iter().skip(1);
        let mut host: Option<String> = None;
        let mut port: Option<u32> = None;

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--host" => {
                    let Some(host_str) = iter.next() else {
                        return Err(CliError::InvalidCommandLineFlag);
                    };

                    host = Some(validate_host_flag(&host_str)?);
                }
                "--port" => {
                    let Some(port_str) = iter.next() else {
                        return Err(CliError::InvalidCommandLineFlag);
                    };

                    port = Some(validate_port_flag(&port_str)?);
                }
                _ => return Err(CliError::InvalidCommandLineFlag),
            }
        }

        Ok(ServerConfig {
            host: host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: port.unwrap_or(DEFAULT_PORT),
        })
    }
}

/// A bound server: listener plus the directory every connection routes
/// through.
pub struct Server {
    listener: TcpListener,
    directory: DirectoryHandle,
}

impl Server {
    /// Binds the listener and spawns the directory. The directory exists
    /// before the first connection is accepted.
    pub async fn bind(config: &ServerConfig) -> io::Result<Server> {
        let listener = TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;
        let directory = directory::spawn();

        Ok(Server {
            listener,
            directory,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the listener fails, one task per client.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, client_address)) => {
                    info!(client = %client_address, "client connected");
                    let directory = self.directory.clone();
                    tokio::spawn(handle_connection(stream, directory));
                }
                Err(error) => {
                    warn!(%error, "failed to accept connection");
                    break;
                }
            }
        }
    }
}

/// Validates a port number from the --port command-line flag.
///
/// # Returns
///
/// * `Ok(u32)` - Valid port number in range 1-65535
/// * `Err(CliError::InvalidPortFlagValue)` - If the port is invalid
fn validate_port_flag(port: &str) -> Result<u32, CliError> {
    let port_number = port
        .parse::<u32>()
        .map_err(|_| CliError::InvalidPortFlagValue)?;

    if port_number < 1 || port_number > 65535 {
        return Err(CliError::InvalidPortFlagValue);
    }

    Ok(port_number)
}

/// Validates a bind address from the --host command-line flag.
///
/// # Supported Host Formats
///
/// - IPv4 addresses: "192.168.1.1"
/// - Hostnames: "localhost", "cache.example.com"
fn validate_host_flag(host: &str) -> Result<String, CliError> {
    let ipv4_regex = Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$").unwrap();
    let hostname_regex = Regex::new(r"^[a-zA-Z0-9\-\.]+$").unwrap();

    let valid = if let Some(caps) = ipv4_regex.captures(host) {
        caps.iter().skip(1).all(|octet| {
            octet
                .map(|m| m.as_str().parse::<u16>().map(|v| v <= 255).unwrap_or(false))
                .unwrap_or(false)
        })
    } else {
        hostname_regex.is_match(host)
    };

    if !valid {
        return Err(CliError::InvalidHostFlagValue);
    }

    Ok(host.to_string())
}
