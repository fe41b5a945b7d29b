use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use netmelee::{PeerOptions, Transport};

/// Non-blocking TCP stream carrying one netplay connection.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        Ok(Self { stream })
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        self.stream.write(data)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }
}

/// Waits for a single peer to connect to `options.host:options.port`.
pub fn accept(options: &PeerOptions, timeout: Duration) -> io::Result<(TcpStream, SocketAddr)> {
    let listener = TcpListener::bind((options.host.as_str(), options.port))?;
    listener.set_nonblocking(true)?;
    log::info!("Listening on {}", listener.local_addr()?);

    let deadline = Instant::now() + timeout;
    loop {
        match listener.accept() {
            Ok((stream, addr)) => return Ok((stream, addr)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "no peer connected in time",
                    ));
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

/// Connects to `options.host:options.port`, trying each resolved address.
pub fn connect(options: &PeerOptions, timeout: Duration) -> io::Result<(TcpStream, SocketAddr)> {
    let mut last_err = None;
    for addr in (options.host.as_str(), options.port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok((stream, addr)),
            Err(e) => {
                log::debug!("Connecting to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} did not resolve to any address", options.host),
        )
    }))
}
