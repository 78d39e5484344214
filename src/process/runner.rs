use std::{
    io,
    path::Path,
    process::Stdio,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    sync::mpsc::UnboundedSender,
    task::JoinHandle,
};
use tracing::{debug, warn};

use super::{ExitOutcome, OutputLine, Stream};

/// How long to keep draining pipes after the child is gone. A grandchild that
/// inherited the pipes can hold them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

type Buffer = Arc<Mutex<String>>;

/// Run `program` with `args`, capturing both streams until exit or `timeout`.
///
/// Every non-empty line is appended to its stream's buffer and, when a
/// listener is given, forwarded to it as it arrives. On timeout the child is
/// killed and reaped before returning. Spawn failures are returned as errors.
pub async fn run(
    program: &Path,
    args: &[String],
    timeout: Duration,
    listener: Option<UnboundedSender<OutputLine>>,
) -> io::Result<ExitOutcome> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);

    let mut child = cmd.spawn()?;
    debug!(pid = ?child.id(), program = %program.display(), "process started");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("stderr was not captured"))?;

    let out_buf = Buffer::default();
    let err_buf = Buffer::default();
    let out_task = spawn_reader(stdout, Stream::Stdout, out_buf.clone(), listener.clone());
    let err_task = spawn_reader(stderr, Stream::Stderr, err_buf.clone(), listener);

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => Some(status?),
        Err(_) => {
            warn!(?timeout, "process timed out, killing");
            if let Err(e) = child.kill().await {
                // Already exited between the timeout firing and the kill.
                debug!(error = %e, "kill after timeout failed");
            }
            None
        }
    };

    drain(out_task).await;
    drain(err_task).await;
    let stdout = take(&out_buf);
    let stderr = take(&err_buf);

    let outcome = match status {
        None => ExitOutcome::TimedOut {
            timeout,
            stdout,
            stderr,
        },
        Some(s) if s.success() => ExitOutcome::Success { stdout, stderr },
        Some(s) => ExitOutcome::Failed {
            code: s.code(),
            stdout,
            stderr,
        },
    };
    Ok(outcome)
}

fn spawn_reader<R>(
    pipe: R,
    stream: Stream,
    buf: Buffer,
    listener: Option<UnboundedSender<OutputLine>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(?stream, error = %e, "pipe read failed");
                    break;
                }
            }
            let text = String::from_utf8_lossy(&raw);
            let text = text.trim_end_matches(['\r', '\n']);
            if text.is_empty() {
                continue;
            }
            if let Ok(mut b) = buf.lock() {
                b.push_str(text);
                b.push('\n');
            }
            if let Some(tx) = &listener {
                let _ = tx.send(OutputLine {
                    stream,
                    text: text.to_string(),
                });
            }
        }
    })
}

async fn drain(mut task: JoinHandle<()>) {
    if tokio::time::timeout(DRAIN_GRACE, &mut task).await.is_err() {
        warn!("output pipe still open after process exit, abandoning reader");
        task.abort();
    }
}

fn take(buf: &Buffer) -> String {
    buf.lock().map(|mut b| std::mem::take(&mut *b)).unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::sync::mpsc;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn zero_exit_is_success_with_stdout() {
        let outcome = run(
            Path::new("sh"),
            &sh("echo one; echo; echo two"),
            Duration::from_secs(10),
            None,
        )
        .await
        .unwrap();
        assert!(matches!(outcome, ExitOutcome::Success { .. }));
        assert_eq!(outcome.stdout(), "one\ntwo\n");
    }

    #[tokio::test]
    async fn non_zero_exit_carries_code_and_stderr() {
        let outcome = run(
            Path::new("sh"),
            &sh("echo working; echo 'bad format' >&2; exit 3"),
            Duration::from_secs(10),
            None,
        )
        .await
        .unwrap();
        match &outcome {
            ExitOutcome::Failed { code, .. } => assert_eq!(*code, Some(3)),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(outcome.diagnostics(), "bad format");
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let started = Instant::now();
        let outcome = run(
            Path::new("sh"),
            &sh("echo $$; exec sleep 30"),
            Duration::from_millis(300),
            None,
        )
        .await
        .unwrap();
        // Killing closes the pipes, so the readers finish well before DRAIN_GRACE.
        assert!(started.elapsed() < DRAIN_GRACE, "took {:?}", started.elapsed());
        assert!(matches!(outcome, ExitOutcome::TimedOut { .. }));

        let pid = outcome.stdout().trim();
        assert!(!pid.is_empty());
        let alive = std::process::Command::new("kill")
            .args(["-0", pid])
            .stderr(Stdio::null())
            .status()
            .unwrap()
            .success();
        assert!(!alive, "pid {pid} still running after timeout");
    }

    #[tokio::test]
    async fn listener_sees_lines_tagged_by_stream() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        run(
            Path::new("sh"),
            &sh("echo out; echo err >&2"),
            Duration::from_secs(10),
            Some(tx),
        )
        .await
        .unwrap();

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        assert!(lines.contains(&OutputLine {
            stream: Stream::Stdout,
            text: "out".into()
        }));
        assert!(lines.contains(&OutputLine {
            stream: Stream::Stderr,
            text: "err".into()
        }));
    }

    #[tokio::test]
    async fn arguments_with_spaces_stay_single_tokens() {
        let args = vec![
            "-c".to_string(),
            r#"echo "$#"; printf '%s\n' "$1""#.to_string(),
            "sh".to_string(),
            "/tmp/My Documents/spec file.docx".to_string(),
        ];
        let outcome = run(Path::new("sh"), &args, Duration::from_secs(10), None)
            .await
            .unwrap();
        assert_eq!(outcome.stdout(), "1\n/tmp/My Documents/spec file.docx\n");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let result = run(
            Path::new("/definitely/not/here/python"),
            &[],
            Duration::from_secs(1),
            None,
        )
        .await;
        assert!(result.is_err());
    }
}
