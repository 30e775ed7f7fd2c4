//! Downloader-side mirror of the connection state machine.
//!
//! Introduces itself as soon as the channel opens, answers the password
//! gate, then walks the catalog file by file, requesting each one from the
//! last byte it holds. Received bytes stay in per-file buffers owned by
//! this struct; durable storage is the caller's concern.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::core::domain::{ClientMeta, FileInfo};
use crate::core::error::ProtocolError;
use crate::protocol::{self, ProtocolMessage};
use crate::transport::PeerChannel;

/// A fully received file, in catalog order
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedFile {
    pub info: FileInfo,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Connecting,
    Authenticating,
    Receiving,
    Done,
}

type ProgressFn = Box<dyn Fn(&FileInfo, u64) + Send>;

pub struct Downloader {
    channel: PeerChannel,
    client: ClientMeta,
    password: Option<String>,
    state: DownloadState,
    catalog: Vec<FileInfo>,
    buffers: HashMap<String, Vec<u8>>,
    on_progress: Option<ProgressFn>,
}

impl Downloader {
    pub fn new(channel: PeerChannel, client: ClientMeta) -> Self {
        Self {
            channel,
            client,
            password: None,
            state: DownloadState::Connecting,
            catalog: Vec::new(),
            buffers: HashMap::new(),
            on_progress: None,
        }
    }

    /// Password to answer the gate with, if the uploader has one configured
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Bytes already held from an interrupted run; each file resumes from
    /// the length of its buffer instead of zero
    pub fn resume_with(mut self, buffers: HashMap<String, Vec<u8>>) -> Self {
        self.buffers = buffers;
        self
    }

    /// Called after every chunk with the file and its received byte count
    pub fn on_progress(mut self, observer: impl Fn(&FileInfo, u64) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(observer));
        self
    }

    pub fn state(&self) -> DownloadState {
        self.state
    }

    /// Drive the whole exchange: handshake, password gate, every file,
    /// `Done`. Returns the received files in catalog order.
    pub async fn run(mut self) -> Result<Vec<DownloadedFile>, ProtocolError> {
        self.channel
            .send_message(&ProtocolMessage::RequestInfo(self.client.clone()))
            .await?;

        loop {
            let Some(frame) = self.channel.recv().await else {
                return Err(ProtocolError::Closed);
            };
            match protocol::decode(&frame)? {
                ProtocolMessage::PasswordRequired { error_message } => {
                    if let Some(reason) = error_message {
                        return Err(ProtocolError::PasswordRejected(reason));
                    }
                    let Some(password) = self.password.clone() else {
                        return Err(ProtocolError::PasswordRequired);
                    };
                    self.state = DownloadState::Authenticating;
                    self.channel
                        .send_message(&ProtocolMessage::UsePassword { password })
                        .await?;
                }

                ProtocolMessage::Info { files } => {
                    info!(files = files.len(), "received catalog");
                    self.catalog = files;
                    if let Some(done) = self.advance().await? {
                        return Ok(done);
                    }
                }

                ProtocolMessage::Chunk {
                    file_name,
                    offset,
                    bytes,
                    is_final,
                } => {
                    if self.state != DownloadState::Receiving {
                        debug!(file_name, "ignoring chunk outside a transfer");
                        continue;
                    }
                    let Some(info) = self
                        .catalog
                        .iter()
                        .find(|f| f.file_name == file_name)
                        .cloned()
                    else {
                        return Err(ProtocolError::violation(format!(
                            "chunk for unknown file {file_name}"
                        )));
                    };
                    let buffer = self.buffers.entry(file_name.clone()).or_default();
                    if offset != buffer.len() as u64 {
                        return Err(ProtocolError::violation(format!(
                            "chunk at offset {offset}, expected {}",
                            buffer.len()
                        )));
                    }
                    buffer.extend_from_slice(&bytes);
                    let received = buffer.len() as u64;
                    if let Some(observer) = &self.on_progress {
                        observer(&info, received);
                    }
                    if is_final {
                        if received != info.size {
                            return Err(ProtocolError::violation(format!(
                                "file {file_name} ended at {received} of {} bytes",
                                info.size
                            )));
                        }
                        if let Some(done) = self.advance().await? {
                            return Ok(done);
                        }
                    }
                }

                ProtocolMessage::Report => {
                    return Err(ProtocolError::Reported);
                }

                other => {
                    debug!(tag = other.tag(), "ignoring unexpected message");
                }
            }
        }
    }

    /// Request the next incomplete file, or send `Done` and collect the
    /// results once every file's received size matches its advertised size.
    async fn advance(&mut self) -> Result<Option<Vec<DownloadedFile>>, ProtocolError> {
        let next = self.catalog.iter().find(|info| {
            let held = self
                .buffers
                .get(&info.file_name)
                .map(|b| b.len() as u64)
                .unwrap_or(0);
            held < info.size
        });

        match next {
            Some(info) => {
                let offset = self
                    .buffers
                    .get(&info.file_name)
                    .map(|b| b.len() as u64)
                    .unwrap_or(0);
                debug!(file_name = %info.file_name, offset, "requesting file");
                self.state = DownloadState::Receiving;
                self.channel
                    .send_message(&ProtocolMessage::Start {
                        file_name: info.file_name.clone(),
                        offset,
                    })
                    .await?;
                Ok(None)
            }
            None => {
                self.state = DownloadState::Done;
                self.channel.send_message(&ProtocolMessage::Done).await?;
                let files = self
                    .catalog
                    .iter()
                    .map(|info| DownloadedFile {
                        info: info.clone(),
                        bytes: self.buffers.remove(&info.file_name).unwrap_or_default(),
                    })
                    .collect();
                Ok(Some(files))
            }
        }
    }
}
