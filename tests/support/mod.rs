use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
#[cfg(unix)]
use std::process::ExitStatus;
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};

/// Serves `responses` to consecutive connections, one each, and returns the
/// raw requests it received.
pub fn serve_sequence(responses: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let addr = listener.local_addr().expect("address should be available");
    let handle = thread::spawn(move || {
        let mut requests = Vec::new();
        for response in responses {
            let (stream, _) = listener.accept().expect("accept should succeed");
            let mut reader = BufReader::new(stream);
            let mut request = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("request line should read");
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().expect("content length should parse");
                }
                request.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).expect("request body should read");
            request.push_str(&String::from_utf8_lossy(&body));

            let mut stream = reader.into_inner();
            stream
                .write_all(response.as_bytes())
                .expect("response should write");
            requests.push(request);
        }
        requests
    });
    (format!("http://{addr}/v1"), handle)
}

pub fn json_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

pub fn sse_response(events: &[&str]) -> String {
    let body: String = events
        .iter()
        .map(|event| format!("data: {event}\n\n"))
        .collect();
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

pub fn models_response() -> String {
    json_response(
        r#"{"object":"list","data":[{"id":"gpt-4o","object":"model","created":1715367049},{"id":"gpt-3.5-turbo-instruct","object":"model","created":1692901427}]}"#,
    )
}

pub fn refused_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let addr = listener.local_addr().expect("address should be available");
    drop(listener);
    format!("http://{addr}/v1")
}

/// A `cha` invocation with a clean, deterministic environment.
pub fn cha_command(base_url: &str) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cha"));
    cmd.arg("--no-color")
        .env("OPENAI_API_KEY", "sk-test")
        .env("OPENAI_BASE_URL", base_url)
        .env("AUGMENT_LINKS", "off")
        .env("MODEL_TIMEOUT_SECS", "5")
        .env("NO_COLOR", "1")
        .env_remove("MODEL")
        .env_remove("MODEL_FILTER")
        .env_remove("SYSTEM_PROMPT")
        .env_remove("RUST_LOG")
        .env_remove("LOG_OUTPUT")
        .env_remove("LOG_FORMAT")
        .env_remove("LOG_FILE_PATH");
    for proxy_var in ["HTTP_PROXY", "HTTPS_PROXY", "ALL_PROXY", "http_proxy", "https_proxy", "all_proxy"] {
        cmd.env_remove(proxy_var);
    }
    cmd
}

pub fn run_with_stdin(mut cmd: Command, stdin: &str) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn cha binary");
    // The process may exit before reading everything, e.g. on a config error.
    let _ = child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(stdin.as_bytes());
    child.wait_with_output().expect("failed to wait for cha binary")
}

/// Feeds `stdin`, waits until the chat prompt has been shown `prompts` times,
/// then sends SIGINT. Returns the exit status and all of stdout.
#[cfg(unix)]
pub fn interrupt_at_prompt(
    mut cmd: Command,
    stdin: &str,
    prompts: usize,
) -> (ExitStatus, String) {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn cha binary");
    // Held open so the session cannot end on EOF before the signal lands.
    let mut input = child.stdin.take().expect("stdin should be piped");
    input
        .write_all(stdin.as_bytes())
        .expect("stdin should accept input");
    let mut stdout = child.stdout.take().expect("stdout should be piped");

    let mut seen = Vec::new();
    let mut buf = [0u8; 512];
    while String::from_utf8_lossy(&seen).matches("User: ").count() < prompts {
        let read = stdout.read(&mut buf).expect("stdout should read");
        assert!(
            read > 0,
            "cha exited before prompting, stdout:\n{}",
            String::from_utf8_lossy(&seen)
        );
        seen.extend_from_slice(&buf[..read]);
    }

    let kill = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .expect("kill should run");
    assert!(kill.success(), "failed to signal cha");

    stdout
        .read_to_end(&mut seen)
        .expect("remaining stdout should read");
    let status = child.wait().expect("failed to wait for cha binary");
    drop(input);
    (status, String::from_utf8_lossy(&seen).into_owned())
}
