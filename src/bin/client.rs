//! One-shot CLI client: connect, send one request frame built from argv,
//! read one response frame, print it, exit. No retry and no connection
//! reuse — framing and process bootstrap for a richer client are out of
//! scope here.

use std::env;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::process::ExitCode;

use kvd::protocol::{self, Value};

const MAX_RESPONSE_BYTES: usize = 64 << 20;

fn main() -> ExitCode {
    let mut args = env::args().skip(1);
    let (Some(addr), command_args) = (args.next(), args.collect::<Vec<String>>()) else {
        eprintln!("usage: kvd-client <host:port> <command> [args...]");
        return ExitCode::FAILURE;
    };
    if command_args.is_empty() {
        eprintln!("usage: kvd-client <host:port> <command> [args...]");
        return ExitCode::FAILURE;
    }

    let frame = encode_request(&command_args);

    let mut stream = match TcpStream::connect(&addr) {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("connect to {addr} failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = stream.write_all(&frame) {
        eprintln!("send failed: {e}");
        return ExitCode::FAILURE;
    }

    match read_one_response(&mut stream) {
        Ok(value) => {
            print_value(&value, 0);
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn encode_request(args: &[String]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&(args.len() as u32).to_le_bytes());
    for arg in args {
        let bytes = arg.as_bytes();
        payload.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        payload.extend_from_slice(bytes);
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    frame
}

fn read_one_response(stream: &mut TcpStream) -> Result<Value, String> {
    let mut response = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match protocol::try_parse_frame(&response, MAX_RESPONSE_BYTES) {
            Ok(Some((_, payload))) => {
                return protocol::decode_value(payload)
                    .map(|(value, _)| value)
                    .map_err(|e| format!("malformed response: {e}"));
            }
            Ok(None) => {}
            Err(e) => return Err(format!("malformed response: {e}")),
        }

        match stream.read(&mut chunk) {
            Ok(0) => return Err("connection closed before a full response arrived".to_string()),
            Ok(n) => response.extend_from_slice(&chunk[..n]),
            Err(e) => return Err(format!("read failed: {e}")),
        }
    }
}

fn print_value(value: &Value, depth: usize) {
    let indent = "  ".repeat(depth);
    match value {
        Value::Nil => println!("{indent}(nil)"),
        Value::Err(code, msg) => println!("{indent}(error {code}) {msg}"),
        Value::Str(s) => println!("{indent}{}", String::from_utf8_lossy(s)),
        Value::Int(v) => println!("{indent}{v}"),
        Value::Dbl(v) => println!("{indent}{v}"),
        Value::Arr(items) => {
            for (i, item) in items.iter().enumerate() {
                print!("{indent}{}) ", i + 1);
                match item {
                    Value::Arr(_) => {
                        println!();
                        print_value(item, depth + 1);
                    }
                    _ => print_value(item, 0),
                }
            }
        }
    }
}
