//! TCP instruction channel.
//!
//! One accepted connection, one reader task. The reader classifies every
//! newline-terminated JSON frame and drops it into the mailbox of its
//! category; the control loop polls the lock-free predicates and takes
//! values when they are fresh.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use static_assertions::assert_impl_all;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ChannelConfig;
use crate::instruction::{
    DriveMission, Instruction, InstructionKind, ManualDriveInstruction, MapPayload,
    ParameterConfiguration, SemiDriveInstruction,
};
use crate::mailbox::Mailbox;

/// Line that forces an emergency stop.
pub const STOP_SENTINEL: &[u8] = b"STOP";

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("connection lost")]
    ConnectionLost,
}

/// Why the reader task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    Shutdown,
    EmergencyStop,
    ConnectionLost,
}

/// What the reader does after one frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FrameOutcome {
    Stored(InstructionKind),
    Ignored,
    Dropped,
    EmergencyStop,
    Fatal,
}

#[derive(Debug)]
struct SharedState {
    manual: Mailbox<ManualDriveInstruction>,
    semi: Mailbox<SemiDriveInstruction>,
    mission: Mailbox<DriveMission>,
    parameters: Mailbox<ParameterConfiguration>,
    map: Mailbox<MapPayload>,

    running: AtomicBool,
    lost_connection: AtomicBool,
    emergency_stop: AtomicBool,
    shutdown: Notify,
    max_frame_bytes: usize,
}

impl SharedState {
    fn new(max_frame_bytes: usize) -> Self {
        Self {
            manual: Mailbox::default(),
            semi: Mailbox::default(),
            mission: Mailbox::default(),
            parameters: Mailbox::default(),
            map: Mailbox::default(),
            running: AtomicBool::new(true),
            lost_connection: AtomicBool::new(false),
            emergency_stop: AtomicBool::new(false),
            shutdown: Notify::new(),
            max_frame_bytes,
        }
    }

    fn deliver(&self, instruction: Instruction) {
        match instruction {
            Instruction::ManualDrive(inst) => self.manual.store(inst),
            Instruction::SemiDrive(inst) => self.semi.store(inst),
            Instruction::DriveMission(inst) => self.mission.store(inst),
            Instruction::Parameters(inst) => self.parameters.store(inst),
            Instruction::Map(inst) => self.map.store(inst),
        }
    }

    fn is_pending(&self, kind: InstructionKind) -> bool {
        match kind {
            InstructionKind::ManualDrive => self.manual.is_pending(),
            InstructionKind::SemiDrive => self.semi.is_pending(),
            InstructionKind::DriveMission => self.mission.is_pending(),
            InstructionKind::Parameters => self.parameters.is_pending(),
            InstructionKind::Map => self.map.is_pending(),
        }
    }

    fn handle_frame(&self, frame: &[u8]) -> FrameOutcome {
        let line = trim_line_ending(frame);
        debug!("frame received ({} bytes)", line.len());

        if line == STOP_SENTINEL {
            info!("STOP received");
            self.emergency_stop.store(true, Ordering::SeqCst);
            return FrameOutcome::EmergencyStop;
        }
        if line.len() > self.max_frame_bytes {
            warn!(
                "dropping frame of {} bytes (limit {})",
                line.len(),
                self.max_frame_bytes
            );
            return FrameOutcome::Dropped;
        }

        match Instruction::from_frame(line) {
            Ok(Some(instruction)) => {
                let kind = instruction.kind();
                debug!("{} stored", kind);
                self.deliver(instruction);
                FrameOutcome::Stored(kind)
            }
            Ok(None) => {
                debug!("frame carries no recognised instruction");
                FrameOutcome::Ignored
            }
            Err(e) if e.is_recoverable() => {
                warn!("could not turn request into an instruction: {}", e);
                FrameOutcome::Dropped
            }
            Err(e) => {
                error!("unrecoverable frame error: {}", e);
                FrameOutcome::Fatal
            }
        }
    }

    fn mark_lost(&self) {
        self.lost_connection.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }
}

fn trim_line_ending(frame: &[u8]) -> &[u8] {
    let mut end = frame.len();
    while end > 0 && matches!(frame[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &frame[..end]
}

async fn read_loop(shared: Arc<SharedState>, read_half: OwnedReadHalf) -> ReaderExit {
    let mut reader = BufReader::new(read_half);
    let mut frame = Vec::new();

    let exit = loop {
        if !shared.running.load(Ordering::SeqCst) {
            break ReaderExit::Shutdown;
        }
        frame.clear();

        let read = tokio::select! {
            biased;
            () = shared.shutdown.notified() => None,
            read = reader.read_until(b'\n', &mut frame) => Some(read),
        };
        let Some(read) = read else {
            if shared.lost_connection.load(Ordering::SeqCst) {
                break ReaderExit::ConnectionLost;
            }
            break ReaderExit::Shutdown;
        };

        match read {
            Ok(0) => {
                error!("connection closed by peer");
                shared.lost_connection.store(true, Ordering::SeqCst);
                break ReaderExit::ConnectionLost;
            }
            Ok(_) => match shared.handle_frame(&frame) {
                FrameOutcome::EmergencyStop => break ReaderExit::EmergencyStop,
                FrameOutcome::Fatal => {
                    shared.lost_connection.store(true, Ordering::SeqCst);
                    break ReaderExit::ConnectionLost;
                }
                FrameOutcome::Stored(kind) => debug!("{} pending", kind),
                FrameOutcome::Ignored | FrameOutcome::Dropped => {}
            },
            Err(e) => {
                error!("connection lost: {}", e);
                shared.lost_connection.store(true, Ordering::SeqCst);
                break ReaderExit::ConnectionLost;
            }
        }
    };

    shared.running.store(false, Ordering::SeqCst);
    info!("reader stopped: {:?}", exit);
    exit
}

pub struct InstructionChannel {
    shared: Arc<SharedState>,
    writer: Mutex<OwnedWriteHalf>,
    reader: Option<JoinHandle<ReaderExit>>,
    peer: SocketAddr,
}

assert_impl_all!(InstructionChannel: Send, Sync);

impl InstructionChannel {
    /// Binds to the configured address and waits for one client.
    pub async fn listen(config: &ChannelConfig) -> Result<Self, ChannelError> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        info!("listening for instructions on {}", listener.local_addr()?);
        Self::accept(&listener, config).await
    }

    /// Waits for the next client on `listener` and starts reading from it.
    pub async fn accept(listener: &TcpListener, config: &ChannelConfig) -> Result<Self, ChannelError> {
        let (stream, _) = listener.accept().await?;
        Self::from_stream(stream, config)
    }

    /// Starts the reader task on an already-accepted connection. Must be
    /// called from within a tokio runtime.
    pub fn from_stream(stream: TcpStream, config: &ChannelConfig) -> Result<Self, ChannelError> {
        let peer = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        let shared = Arc::new(SharedState::new(config.max_frame_bytes));
        let reader = tokio::spawn(read_loop(Arc::clone(&shared), read_half));
        info!("connection established with {}", peer);

        Ok(Self {
            shared,
            writer: Mutex::new(write_half),
            reader: Some(reader),
            peer,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Stops the reader, waits for it and closes the connection.
    pub async fn shutdown(mut self) -> ReaderExit {
        info!("connection terminated");
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.shutdown.notify_one();

        let exit = match self.reader.take() {
            Some(handle) => handle.await.unwrap_or(ReaderExit::Shutdown),
            None => ReaderExit::Shutdown,
        };
        let _ = self.writer.lock().await.shutdown().await;
        exit
    }

    /// Waits for the reader to stop on its own (STOP, peer close, fatal
    /// error) without signalling it.
    pub async fn join(&mut self) -> ReaderExit {
        match self.reader.take() {
            Some(handle) => handle.await.unwrap_or(ReaderExit::Shutdown),
            None => ReaderExit::Shutdown,
        }
    }

    // Writers

    /// Sends `line` followed by a newline.
    pub async fn write(&self, line: &str) -> Result<(), ChannelError> {
        let mut message = String::with_capacity(line.len() + 1);
        message.push_str(line);
        message.push('\n');
        self.send(message.as_bytes()).await
    }

    /// Sends `{"<label>":"<message>"}`.
    pub async fn write_formatted(&self, label: &str, message: &str) -> Result<(), ChannelError> {
        let mut object = serde_json::Map::new();
        object.insert(label.to_string(), Value::String(message.to_string()));
        let line = serde_json::to_string(&Value::Object(object))?;
        self.write(&line).await
    }

    /// Sends `{"InstructionId": "<id>"}`.
    pub async fn send_instruction_id(&self, id: &str) -> Result<(), ChannelError> {
        let line = format!("{{\"InstructionId\": {}}}", serde_json::to_string(id)?);
        self.write(&line).await
    }

    async fn send(&self, bytes: &[u8]) -> Result<(), ChannelError> {
        if self.shared.lost_connection.load(Ordering::SeqCst) {
            return Err(ChannelError::ConnectionLost);
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.write_all(bytes).await {
            error!("write failed, connection lost: {}", e);
            self.shared.mark_lost();
            return Err(e.into());
        }
        Ok(())
    }

    // Predicates

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn has_lost_connection(&self) -> bool {
        self.shared.lost_connection.load(Ordering::SeqCst)
    }

    pub fn emergency_received(&self) -> bool {
        self.shared.emergency_stop.load(Ordering::SeqCst)
    }

    pub fn is_pending(&self, kind: InstructionKind) -> bool {
        self.shared.is_pending(kind)
    }

    pub fn new_manual_instruction(&self) -> bool {
        self.shared.manual.is_pending()
    }

    pub fn new_semi_instruction(&self) -> bool {
        self.shared.semi.is_pending()
    }

    pub fn new_drive_mission(&self) -> bool {
        self.shared.mission.is_pending()
    }

    pub fn new_parameters(&self) -> bool {
        self.shared.parameters.is_pending()
    }

    pub fn new_map(&self) -> bool {
        self.shared.map.is_pending()
    }

    // Getters. Each clears the pending flag of its category and returns the
    // stored value, fresh or not.

    pub fn manual_drive_instruction(&self) -> ManualDriveInstruction {
        let inst = self.shared.manual.take();
        info!(throttle = inst.throttle, steering = inst.steering, "manual drive instruction");
        inst
    }

    pub fn semi_drive_instruction(&self) -> SemiDriveInstruction {
        let inst = self.shared.semi.take();
        info!(direction = inst.direction, id = %inst.id, "semi drive instruction");
        inst
    }

    pub fn drive_mission(&self) -> DriveMission {
        self.shared.mission.take()
    }

    pub fn parameter_configuration(&self) -> ParameterConfiguration {
        let params = self.shared.parameters.take();
        debug!(
            steering_kp = params.steering_kp,
            steering_kd = params.steering_kd,
            speed_kp = params.speed_kp,
            speed_ki = params.speed_ki,
            turn_kd = params.turn_kd,
            angle_offset = params.angle_offset,
            "parameter configuration"
        );
        params
    }

    pub fn map(&self) -> MapPayload {
        self.shared.map.take()
    }

    /// Takes the stored value of `kind` as an [`Instruction`].
    pub fn take(&self, kind: InstructionKind) -> Instruction {
        match kind {
            InstructionKind::ManualDrive => Instruction::ManualDrive(self.manual_drive_instruction()),
            InstructionKind::SemiDrive => Instruction::SemiDrive(self.semi_drive_instruction()),
            InstructionKind::DriveMission => Instruction::DriveMission(self.drive_mission()),
            InstructionKind::Parameters => Instruction::Parameters(self.parameter_configuration()),
            InstructionKind::Map => Instruction::Map(self.map()),
        }
    }
}

impl Drop for InstructionChannel {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.shutdown.notify_one();
        if let Some(handle) = self.reader.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_line_ending() {
        assert_eq!(trim_line_ending(b"STOP\n"), b"STOP");
        assert_eq!(trim_line_ending(b"STOP\r\n"), b"STOP");
        assert_eq!(trim_line_ending(b"STOP"), b"STOP");
        assert_eq!(trim_line_ending(b"\n"), b"");
    }

    #[test]
    fn test_handle_frame_priority_order() {
        let shared = SharedState::new(1024);
        let frame = br#"{"MapData":{"cells":[]},"SemiDriveInstruction":{"direction":1,"id":"a"}}"#;
        assert_eq!(
            shared.handle_frame(frame),
            FrameOutcome::Stored(InstructionKind::SemiDrive)
        );
        assert!(shared.semi.is_pending());
        assert!(!shared.map.is_pending());
    }

    #[test]
    fn test_handle_frame_drops_oversized() {
        let shared = SharedState::new(16);
        let frame = br#"{"ManualDriveInstruction":{"throttle":1,"steering":2}}"#;
        assert_eq!(shared.handle_frame(frame), FrameOutcome::Dropped);
        assert!(!shared.manual.is_pending());
    }

    #[test]
    fn test_handle_frame_unrecognised_object() {
        let shared = SharedState::new(1024);
        assert_eq!(shared.handle_frame(b"{\"Hello\":1}\n"), FrameOutcome::Ignored);
        assert_eq!(shared.handle_frame(b"[1,2,3]\n"), FrameOutcome::Ignored);
    }

    #[test]
    fn test_stop_sets_emergency_only() {
        let shared = SharedState::new(1024);
        assert_eq!(shared.handle_frame(b"STOP\n"), FrameOutcome::EmergencyStop);
        assert!(shared.emergency_stop.load(Ordering::SeqCst));
        assert!(!shared.lost_connection.load(Ordering::SeqCst));
    }
}
