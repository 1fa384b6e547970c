pub type Pid = u32;
pub type OutputBlob = bytes::Bytes;
