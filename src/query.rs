// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! The query server: a secondary, unauthenticated text endpoint for
//! introspecting the parameter tree, independent of the binary
//! protocol. One connection per client thread, line-oriented,
//! intentionally dumb: it reads the schema, never mutates it.

use crate::tree::container::{Container, Lookup};
use log::{debug, warn};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Accepts TCP connections and answers `ls`, `info`, and `find` against
/// a shared tree. Mutation opcodes are deliberately absent: the query
/// server exists for discovery, not control.
pub struct QueryServer {
    root: Arc<Mutex<Container>>,
    listener: TcpListener,
    stop: Arc<AtomicBool>,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
}

impl QueryServer {
    pub fn bind(port: u16, root: Arc<Mutex<Container>>) -> std::io::Result<QueryServer> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        Ok(QueryServer {
            root,
            listener,
            stop: Arc::new(AtomicBool::new(false)),
            accept_thread: Mutex::new(None),
        })
    }

    pub fn start(self: &Arc<Self>) -> std::io::Result<()> {
        let server = self.clone();
        let handle = std::thread::spawn(move || server.accept_loop());
        *self.accept_thread.lock().expect("query accept thread mutex poisoned") = Some(handle);
        Ok(())
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        // Nudge the blocking accept() loop awake by connecting once.
        if let Ok(addr) = self.listener.local_addr() {
            let _ = TcpStream::connect(addr);
        }
        if let Some(handle) = self
            .accept_thread
            .lock()
            .expect("query accept thread mutex poisoned")
            .take()
        {
            let _ = handle.join();
        }
    }

    fn accept_loop(self: Arc<Self>) {
        while !self.stop.load(Ordering::Acquire) {
            let stream = match self.listener.accept() {
                Ok((s, _)) => s,
                Err(e) => {
                    debug!("query server: accept error: {}", e);
                    continue;
                }
            };
            if self.stop.load(Ordering::Acquire) {
                break;
            }
            let root = self.root.clone();
            std::thread::spawn(move || handle_connection(stream, root));
        }
    }
}

fn handle_connection(stream: TcpStream, root: Arc<Mutex<Container>>) {
    let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_default();
    let mut writer = match stream.try_clone() {
        Ok(w) => w,
        Err(e) => {
            warn!("query server: failed to clone stream for {}: {}", peer, e);
            return;
        }
    };
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let reply = dispatch_line(&root, line);
        if writeln!(writer, "{}", reply).is_err() {
            break;
        }
    }
    debug!("query server: connection from {} closed", peer);
}

fn dispatch_line(root: &Mutex<Container>, line: &str) -> String {
    let mut parts = line.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("");
    let arg = parts.next().unwrap_or("").trim();
    let Ok(root) = root.lock() else {
        return "ERR lock".to_string();
    };
    match cmd {
        "ls" => list(&root, arg),
        "info" => info(&root, arg),
        "find" => find(&root, arg),
        _ => format!("ERR unknown command {:?}", cmd),
    }
}

fn list(root: &Container, path: &str) -> String {
    match root.resolve(path) {
        Some(Lookup::Container(c)) => c.child_name_list().join(" "),
        Some(Lookup::Parameter(p)) => p.name().to_string(),
        None => format!("ERR notfound {}", path),
    }
}

fn info(root: &Container, path: &str) -> String {
    let Some(Lookup::Parameter(p)) = root.resolve(path) else {
        return format!("ERR notfound {}", path);
    };
    let access = p.access();
    format!(
        "{} type={:?} readable={} writable={} invokable={} tabular={} file={}",
        p.name(),
        p.type_code(),
        access.readable,
        access.writable,
        access.invokable,
        access.tabular,
        access.file_like,
    )
}

fn find(root: &Container, pattern: &str) -> String {
    let matches = root.find(pattern);
    if matches.is_empty() {
        return "ERR notfound".to_string();
    }
    matches
        .into_iter()
        .map(|(path, _)| path)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::param::{Access, ScalarParam};
    use std::io::Read;

    fn sample_tree() -> Arc<Mutex<Container>> {
        let mut root = Container::root();
        let mut motor = Container::new("motor");
        motor.add_parameter(Arc::new(crate::tree::param::Parameter::new(
            "velocity",
            Access::scalar_ro(),
            Box::new(ScalarParam::read_only(|| 1.0f32)),
        )));
        root.add_container(motor);
        Arc::new(Mutex::new(root))
    }

    #[test]
    fn ls_lists_root_children() {
        let root = sample_tree();
        let reply = dispatch_line(&root, "ls /");
        assert_eq!(reply, "motor");
    }

    #[test]
    fn info_reports_access_flags() {
        let root = sample_tree();
        let reply = dispatch_line(&root, "info /motor/velocity");
        assert!(reply.contains("readable=true"));
        assert!(reply.contains("writable=false"));
    }

    #[test]
    fn find_matches_glob() {
        let root = sample_tree();
        let reply = dispatch_line(&root, "find motor/*");
        assert_eq!(reply, "/motor/velocity");
    }

    #[test]
    fn unknown_command_is_an_error() {
        let root = sample_tree();
        let reply = dispatch_line(&root, "bogus /");
        assert!(reply.starts_with("ERR"));
    }

    #[test]
    fn end_to_end_over_a_real_socket() {
        let root = sample_tree();
        let server = Arc::new(QueryServer::bind(0, root).unwrap());
        let addr = server.listener.local_addr().unwrap();
        server.start().unwrap();

        let mut stream = TcpStream::connect(addr).unwrap();
        writeln!(stream, "ls /").unwrap();
        let mut buf = [0u8; 64];
        let n = stream.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"motor\n");

        server.stop();
    }
}
