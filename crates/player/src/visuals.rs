//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! Visuals state, owned by the main thread.
//!
//! The control socket runs on a worker thread but a graphics context
//! must live on the main thread, so commands travel over a bounded
//! channel: the socket side holds a [`VisualsHandle`], the main thread
//! runs the [`VisualsHost`] loop. Rendering itself is outside this
//! crate; the host tracks activation and the selected shader and
//! answers status queries through shared state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Commands crossing from the control thread to the main thread.
#[derive(Debug)]
pub enum VisualsCommand {
    Start,
    Stop,
    Shader(ShaderAction),
}

#[derive(Debug)]
pub enum ShaderAction {
    Next,
    Prev,
    Named(String),
}

#[derive(Default)]
struct Shared {
    active: AtomicBool,
    current_shader: Mutex<Option<String>>,
}

/// Control-thread side: formats replies for the socket protocol.
#[derive(Clone)]
pub struct VisualsHandle {
    tx: SyncSender<VisualsCommand>,
    shared: Arc<Shared>,
}

/// Main-thread side: processes commands until the daemon shuts down.
pub struct VisualsHost {
    rx: Receiver<VisualsCommand>,
    shared: Arc<Shared>,
    shaders: Vec<String>,
}

/// Create the command channel. `shaders` is the discovered shader name
/// list, in presentation order.
pub fn channel(shaders: Vec<String>) -> (VisualsHandle, VisualsHost) {
    let (tx, rx) = mpsc::sync_channel(8);
    let shared = Arc::new(Shared::default());
    (
        VisualsHandle {
            tx,
            shared: Arc::clone(&shared),
        },
        VisualsHost {
            rx,
            shared,
            shaders,
        },
    )
}

impl VisualsHandle {
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    pub fn start(&self) -> String {
        if self.is_active() {
            return "Visuals already running".to_string();
        }
        self.send(VisualsCommand::Start, "Starting visuals...")
    }

    pub fn stop(&self) -> String {
        if !self.is_active() {
            return "Visuals not running".to_string();
        }
        self.send(VisualsCommand::Stop, "Stopping visuals...")
    }

    pub fn status(&self) -> String {
        if self.is_active() {
            match self.shared.current_shader.lock().unwrap().as_deref() {
                Some(shader) => format!("Visuals: RUNNING ({shader})"),
                None => "Visuals: RUNNING".to_string(),
            }
        } else {
            "Visuals: STOPPED".to_string()
        }
    }

    /// Handle `shader next|prev|<name>` from the control socket.
    pub fn shader(&self, argument: &str) -> String {
        if !self.is_active() {
            return "ERROR: Visuals not running".to_string();
        }
        let action = match argument.trim() {
            "" => return "ERROR: Missing shader argument".to_string(),
            "next" => ShaderAction::Next,
            "prev" => ShaderAction::Prev,
            name => ShaderAction::Named(name.to_string()),
        };
        self.send(VisualsCommand::Shader(action), "Shader command sent")
    }

    fn send(&self, command: VisualsCommand, ok: &str) -> String {
        match self.tx.try_send(command) {
            Ok(()) => ok.to_string(),
            Err(TrySendError::Full(_)) => "ERROR: Visuals busy".to_string(),
            Err(TrySendError::Disconnected(_)) => "ERROR: Visuals unavailable".to_string(),
        }
    }
}

impl VisualsHost {
    /// Process commands until `running` goes false. Runs on the main
    /// thread; a renderer would own its graphics context here.
    pub fn run(mut self, running: &AtomicBool) {
        while running.load(Ordering::Acquire) {
            match self.rx.recv_timeout(Duration::from_millis(100)) {
                Ok(command) => self.handle(command),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        self.shared.active.store(false, Ordering::Release);
    }

    fn handle(&mut self, command: VisualsCommand) {
        match command {
            VisualsCommand::Start => {
                let mut current = self.shared.current_shader.lock().unwrap();
                if current.is_none() {
                    *current = self.shaders.first().cloned();
                }
                self.shared.active.store(true, Ordering::Release);
                match current.as_deref() {
                    Some(shader) => println!("[VIS] Visuals started (shader: {shader})"),
                    None => println!("[VIS] Visuals started (no shaders found)"),
                }
            }
            VisualsCommand::Stop => {
                self.shared.active.store(false, Ordering::Release);
                println!("[VIS] Visuals stopped");
            }
            VisualsCommand::Shader(action) => self.select_shader(action),
        }
    }

    fn select_shader(&mut self, action: ShaderAction) {
        if self.shaders.is_empty() {
            eprintln!("[WARN] shader command without any shaders installed");
            return;
        }

        let mut current = self.shared.current_shader.lock().unwrap();
        let index = current
            .as_deref()
            .and_then(|name| self.shaders.iter().position(|s| s == name))
            .unwrap_or(0);

        let next = match action {
            ShaderAction::Next => (index + 1) % self.shaders.len(),
            ShaderAction::Prev => (index + self.shaders.len() - 1) % self.shaders.len(),
            ShaderAction::Named(name) => match self.shaders.iter().position(|s| *s == name) {
                Some(found) => found,
                None => {
                    eprintln!("[WARN] unknown shader \"{name}\"");
                    return;
                }
            },
        };

        *current = Some(self.shaders[next].clone());
        println!("[VIS] Shader: {}", self.shaders[next]);
    }
}
