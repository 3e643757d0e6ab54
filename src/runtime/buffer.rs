//! ArrayBuffer storage and element codecs shared by DataView and typed arrays

use std::cell::RefCell;
use std::rc::Rc;

/// Backing store of an ArrayBuffer
#[derive(Debug, Clone)]
pub struct ArrayBufferData {
    bytes: Vec<u8>,
    detached: bool,
}

pub type BufferRef = Rc<RefCell<ArrayBufferData>>;

impl ArrayBufferData {
    pub fn new(byte_length: usize) -> Self {
        ArrayBufferData {
            bytes: vec![0; byte_length],
            detached: false,
        }
    }

    pub fn new_ref(byte_length: usize) -> BufferRef {
        Rc::new(RefCell::new(Self::new(byte_length)))
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Byte length; a detached buffer has length zero
    pub fn byte_length(&self) -> usize {
        if self.detached {
            0
        } else {
            self.bytes.len()
        }
    }

    /// Release the store. Every view over it observes length zero afterwards.
    pub fn detach(&mut self) {
        self.bytes = Vec::new();
        self.detached = true;
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// Element encoding of a DataView accessor or typed array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Int8,
    Uint8,
    Uint8Clamped,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

impl ElementType {
    pub fn size(self) -> usize {
        match self {
            ElementType::Int8 | ElementType::Uint8 | ElementType::Uint8Clamped => 1,
            ElementType::Int16 | ElementType::Uint16 => 2,
            ElementType::Int32 | ElementType::Uint32 | ElementType::Float32 => 4,
            ElementType::Float64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementType::Int8 => "Int8",
            ElementType::Uint8 => "Uint8",
            ElementType::Uint8Clamped => "Uint8Clamped",
            ElementType::Int16 => "Int16",
            ElementType::Uint16 => "Uint16",
            ElementType::Int32 => "Int32",
            ElementType::Uint32 => "Uint32",
            ElementType::Float32 => "Float32",
            ElementType::Float64 => "Float64",
        }
    }

    /// Decode one element from `bytes[..self.size()]`
    pub fn read(self, bytes: &[u8], little_endian: bool) -> f64 {
        let mut raw = [0u8; 8];
        let size = self.size();
        raw[..size].copy_from_slice(&bytes[..size]);
        if !little_endian {
            raw[..size].reverse();
        }
        match self {
            ElementType::Int8 => raw[0] as i8 as f64,
            ElementType::Uint8 | ElementType::Uint8Clamped => raw[0] as f64,
            ElementType::Int16 => i16::from_le_bytes([raw[0], raw[1]]) as f64,
            ElementType::Uint16 => u16::from_le_bytes([raw[0], raw[1]]) as f64,
            ElementType::Int32 => i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
            ElementType::Uint32 => u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
            ElementType::Float32 => f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
            ElementType::Float64 => f64::from_le_bytes(raw),
        }
    }

    /// Encode `value` into `bytes[..self.size()]` with the JS conversion for the type
    pub fn write(self, bytes: &mut [u8], value: f64, little_endian: bool) {
        let mut raw = [0u8; 8];
        let bits = to_uint32_bits(value);
        match self {
            ElementType::Int8 | ElementType::Uint8 => raw[0] = bits as u8,
            ElementType::Uint8Clamped => raw[0] = to_uint8_clamp(value),
            ElementType::Int16 | ElementType::Uint16 => {
                raw[..2].copy_from_slice(&(bits as u16).to_le_bytes())
            }
            ElementType::Int32 | ElementType::Uint32 => raw[..4].copy_from_slice(&bits.to_le_bytes()),
            ElementType::Float32 => raw[..4].copy_from_slice(&(value as f32).to_le_bytes()),
            ElementType::Float64 => raw.copy_from_slice(&value.to_le_bytes()),
        }
        let size = self.size();
        if !little_endian {
            raw[..size].reverse();
        }
        bytes[..size].copy_from_slice(&raw[..size]);
    }
}

/// ToUint32: the low 32 bits of the truncated value (0 for NaN and infinities)
pub fn to_uint32_bits(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    value.trunc().rem_euclid(4_294_967_296.0) as u32
}

/// ToUint8Clamp: clamp to 0..=255, rounding half to even
pub fn to_uint8_clamp(value: f64) -> u8 {
    if value.is_nan() || value <= 0.0 {
        return 0;
    }
    if value >= 255.0 {
        return 255;
    }
    let floor = value.floor();
    let diff = value - floor;
    let rounded = if diff > 0.5 {
        floor + 1.0
    } else if diff < 0.5 {
        floor
    } else if floor % 2.0 == 0.0 {
        floor
    } else {
        floor + 1.0
    };
    rounded as u8
}
