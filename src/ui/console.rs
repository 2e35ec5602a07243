use std::future::Future;
use std::io::Write;

use anyhow::Result;
use log::info;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::analysis::Analyzer;
use crate::controller::AppController;
use crate::error::ControllerError;

use super::render::{render, render_metrics, CAMERA_DENIED_NOTICE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    CaptureNow,
    Start,
    Stop,
    Metrics,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "c" | "capture" => Some(Self::CaptureNow),
            "r" | "start" => Some(Self::Start),
            "s" | "stop" => Some(Self::Stop),
            "m" | "metrics" => Some(Self::Metrics),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

const HELP: &str = "commands: [c]apture now, [s]top, [r]un (start after stop), [m]etrics, [q]uit";

/// Drive the controller from stdin and redraw on every display change,
/// including the timer being armed once the camera is ready.
/// Returns after `quit`, Ctrl-C, or end of input, with capture stopped.
pub async fn run_console<A: Analyzer>(controller: AppController<A>) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    drive(controller, stdin, tokio::signal::ctrl_c()).await
}

/// The console loop over any line source. `interrupt` is polled across all
/// iterations, so it fires even if it resolves while a redraw is running.
pub async fn drive<A, R, I, T>(controller: AppController<A>, input: R, interrupt: I) -> Result<()>
where
    A: Analyzer,
    R: AsyncBufRead + Unpin,
    I: Future<Output = T>,
{
    let mut display_rx = controller.subscribe();
    let mut lines = input.lines();
    tokio::pin!(interrupt);

    start_session(&controller).await;
    redraw(&controller).await;
    println!("{HELP}");

    loop {
        tokio::select! {
            changed = display_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                redraw(&controller).await;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match Command::parse(&line) {
                    Some(Command::CaptureNow) => {
                        if controller.capture_now().await.is_none() {
                            println!("capture is stopped; use 'r' to start");
                        }
                    }
                    Some(Command::Start) => {
                        start_session(&controller).await;
                        redraw(&controller).await;
                    }
                    Some(Command::Stop) => {
                        controller.stop().await;
                    }
                    Some(Command::Metrics) => {
                        println!("{}", render_metrics(&controller.metrics().await));
                    }
                    Some(Command::Quit) => break,
                    None if line.trim().is_empty() => {}
                    None => println!("{HELP}"),
                }
            }
            _ = &mut interrupt => {
                info!("interrupt received");
                break;
            }
        }
    }

    controller.stop().await;
    Ok(())
}

async fn start_session<A: Analyzer>(controller: &AppController<A>) {
    match controller.start().await {
        Ok(()) => {}
        Err(ControllerError::AlreadyRunning) => println!("capture already running"),
        Err(ControllerError::Camera(err)) => {
            // Blocking notice: the session cannot run without a camera.
            eprintln!("\n!! {CAMERA_DENIED_NOTICE}\n!! {err}\n");
        }
    }
}

async fn redraw<A: Analyzer>(controller: &AppController<A>) {
    let state = controller.display();
    let camera = controller.camera_status().await;
    let panel = render(&state, camera.as_ref(), controller.settings().capture.interval());

    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "\n{panel}");
    let _ = stdout.flush();
}
