//! Protocol module containing the DAP framing codec.

pub mod codec;

pub use codec::{
    decode_all, encode_frame, frame_header, Frame, FrameDecoder, FramingError,
    DEFAULT_MAX_CONTENT_LENGTH, MAX_HEADER_LINE,
};
