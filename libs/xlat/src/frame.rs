use smallvec::SmallVec;

pub use ip_packet::AddressFamily;

/// One datagram ready for emission.
///
/// The header bytes are freshly built by the translator; the payload
/// borrows the input buffer. The TUN writer emits packet-information
/// header, `header` and `payload` in a single vectored write, so a packet
/// either leaves whole or not at all.
#[derive(Debug)]
pub struct Frame<'p> {
    pub af: AddressFamily,
    pub header: Vec<u8>,
    pub payload: &'p [u8],
}

/// Translating one input yields zero frames (drop), one (forward, reject,
/// hairpin) or several (fragmentation).
pub type Frames<'p> = SmallVec<[Frame<'p>; 2]>;

impl Frame<'_> {
    pub fn len(&self) -> usize {
        self.header.len() + self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The assembled datagram. Test and diagnostics helper; the data path
    /// writes the parts without gathering them first.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(self.payload);

        out
    }
}
