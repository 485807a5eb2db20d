//! Turtle wire items
//!
//! Framing and byte-level (de)serialization belong to the transport. Items
//! here are plain values: forwarding a request means copying it with a new
//! depth, never mutating the one that was received.

use crate::identity::{Sha1Sum, SHA1_LENGTH};
use std::fmt;

/// Size of the generic item header added by the framing layer
pub const ITEM_HEADER_SIZE: usize = 8;

/// Which end of a tunnel sent a data item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TunnelDirection {
    /// Sent by the end that dug the tunnel (the downloader)
    Client,
    /// Sent by the end that answered the tunnel request (the content holder)
    Server,
}

/// Request to dig a tunnel toward whoever can serve `file_hash`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRequestItem {
    /// Flood identifier, shared by every copy of this request
    pub request_id: u32,
    /// Half of the final tunnel id, chosen by the originator
    pub partial_tunnel_id: u32,
    /// Hops travelled so far
    pub depth: u16,
    /// Encrypted content hash
    pub file_hash: Sha1Sum,
}

impl TunnelRequestItem {
    /// Copy of this request carrying a new depth
    pub fn with_depth(&self, depth: u16) -> Self {
        Self { depth, ..self.clone() }
    }
}

/// Answer to a tunnel request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelResultItem {
    /// Request being answered
    pub request_id: u32,
    /// Full tunnel id
    pub tunnel_id: u32,
}

/// Keyword search flooded through the overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequestItem {
    /// Flood identifier
    pub request_id: u32,
    /// Hops travelled so far
    pub depth: u16,
    /// Search keywords
    pub keywords: String,
}

impl SearchRequestItem {
    /// Copy of this request carrying a new depth
    pub fn with_depth(&self, depth: u16) -> Self {
        Self { depth, ..self.clone() }
    }
}

/// Search hits travelling back toward the requester
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResultItem {
    /// Request being answered
    pub request_id: u32,
    /// Depth at which the hits were found
    pub depth: u16,
    /// Opaque client-specific results
    pub results: Vec<Vec<u8>>,
}

/// Client data sent through an established tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelDataItem {
    /// Tunnel the data travels in
    pub tunnel_id: u32,
    /// Which end sent it
    pub direction: TunnelDirection,
    /// Opaque client payload
    pub payload: Vec<u8>,
}

/// Every item the turtle service exchanges with its peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurtleItem {
    /// Tunnel digging request
    TunnelRequest(TunnelRequestItem),
    /// Tunnel digging answer
    TunnelResult(TunnelResultItem),
    /// Keyword search
    SearchRequest(SearchRequestItem),
    /// Keyword search answer
    SearchResult(SearchResultItem),
    /// Tunnel payload
    TunnelData(TunnelDataItem),
}

impl TurtleItem {
    /// Item subtype as registered with the service framing layer
    pub fn sub_type(&self) -> u8 {
        match self {
            Self::SearchRequest(_) => 11,
            Self::TunnelRequest(_) => 3,
            Self::TunnelResult(_) => 4,
            Self::SearchResult(_) => 12,
            Self::TunnelData(_) => 16,
        }
    }

    /// Approximate serialized size, used for bandwidth accounting
    pub fn wire_size(&self) -> usize {
        ITEM_HEADER_SIZE
            + match self {
                Self::TunnelRequest(_) => 4 + 4 + 2 + SHA1_LENGTH,
                Self::TunnelResult(_) => 4 + 4,
                Self::SearchRequest(item) => 4 + 2 + 4 + item.keywords.len(),
                Self::SearchResult(item) => {
                    4 + 2 + 4 + item.results.iter().map(|r| 4 + r.len()).sum::<usize>()
                },
                Self::TunnelData(item) => 4 + 4 + 4 + item.payload.len(),
            }
    }
}

impl fmt::Display for TurtleItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TunnelRequest(item) => write!(
                f,
                "TunnelRequest{{requestId={:08x}, partialTunnelId={:08x}, depth={}, hash={}}}",
                item.request_id, item.partial_tunnel_id, item.depth, item.file_hash
            ),
            Self::TunnelResult(item) => write!(
                f,
                "TunnelResult{{requestId={:08x}, tunnelId={:08x}}}",
                item.request_id, item.tunnel_id
            ),
            Self::SearchRequest(item) => write!(
                f,
                "SearchRequest{{requestId={:08x}, depth={}}}",
                item.request_id, item.depth
            ),
            Self::SearchResult(item) => write!(
                f,
                "SearchResult{{requestId={:08x}, depth={}, hits={}}}",
                item.request_id,
                item.depth,
                item.results.len()
            ),
            Self::TunnelData(item) => write!(
                f,
                "TunnelData{{tunnelId={:08x}, direction={:?}, size={}}}",
                item.tunnel_id,
                item.direction,
                item.payload.len()
            ),
        }
    }
}
