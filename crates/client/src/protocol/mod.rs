// BSD 3-Clause License
// Copyright (c) 2026, Virtual Cable S.L.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice,
//    this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice,
//    this list of conditions and the following disclaimer in the documentation
//    and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors
//    may be used to endorse or promote products derived from this software
//    without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS"
// AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE
// IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE
// FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL
// DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER
// CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY,
// OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

pub mod command;
pub mod handshake;
pub mod package_stream;

use shared::errors::ClientError;

/// Low 6 bits of `packetType`; the top two bits carry compression/encryption
/// flags this crate accepts and propagates but never interprets (codec
/// internals belong to the transport layer, out of scope here).
pub const BASE_TYPE_MASK: u8 = 0x3F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Handshake,
    HandshakeResp,
    Heartbeat,
    JsonCommand,
    CommandResp,
    TunnelOpen,
    TunnelOpenAck,
    Unknown(u8),
}

impl From<u8> for BaseType {
    fn from(value: u8) -> Self {
        match value & BASE_TYPE_MASK {
            0 => BaseType::Handshake,
            1 => BaseType::HandshakeResp,
            2 => BaseType::Heartbeat,
            3 => BaseType::JsonCommand,
            4 => BaseType::CommandResp,
            5 => BaseType::TunnelOpen,
            6 => BaseType::TunnelOpenAck,
            other => BaseType::Unknown(other),
        }
    }
}

impl From<BaseType> for u8 {
    fn from(value: BaseType) -> Self {
        match value {
            BaseType::Handshake => 0,
            BaseType::HandshakeResp => 1,
            BaseType::Heartbeat => 2,
            BaseType::JsonCommand => 3,
            BaseType::CommandResp => 4,
            BaseType::TunnelOpen => 5,
            BaseType::TunnelOpenAck => 6,
            BaseType::Unknown(other) => other,
        }
    }
}

/// Compression/encryption flag bits carried in the top two bits of
/// `packetType`. This crate never compresses or encrypts payloads; it only
/// masks them off when reading and writes zero when sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketFlags(u8);

impl PacketFlags {
    pub const COMPRESSED: PacketFlags = PacketFlags(0b0100_0000);
    pub const ENCRYPTED: PacketFlags = PacketFlags(0b1000_0000);

    pub fn from_byte(byte: u8) -> Self {
        PacketFlags(byte & !BASE_TYPE_MASK)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: PacketFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// One decoded packet off the wire: base type, raw flags, and payload bytes.
#[derive(Debug, Clone)]
pub struct Packet {
    pub base_type: BaseType,
    pub flags: PacketFlags,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(base_type: BaseType, payload: Vec<u8>) -> Self {
        Packet {
            base_type,
            flags: PacketFlags::default(),
            payload,
        }
    }

    pub fn heartbeat() -> Self {
        Packet::new(BaseType::Heartbeat, Vec::new())
    }

    pub fn packet_type_byte(&self) -> u8 {
        u8::from(self.base_type) | self.flags.bits()
    }

    pub fn json_payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_slice(&self.payload).map_err(ClientError::from)
    }
}
