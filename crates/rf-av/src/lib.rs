//! # rf-av
//!
//! Everything in relayforge that touches the external media tools.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support for short request/response invocations.
//! - **Argument synthesis** ([`build_args`]) -- map a [`rf_core::StreamRequest`]
//!   onto an ffmpeg command line.
//! - **Process management** ([`Transcoder`], [`TranscodeStream`]) -- one engine
//!   per request, output relayed as a byte stream, killed when the consumer
//!   goes away.
//! - **Probing** ([`probe_duration`]) -- source duration via ffprobe.

pub mod command;
pub mod probe;
pub mod tools;
pub mod transcode;

pub use command::{ToolCommand, ToolOutput};
pub use probe::{probe_duration, SourceMetadata};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use transcode::{
    build_args, command_line, EncoderSettings, JobState, TranscodeStream, Transcoder,
};
