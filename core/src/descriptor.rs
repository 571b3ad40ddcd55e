/// Length in bytes of the binary descriptors produced by the feature finder.
pub const DESCRIPTOR_BYTES: usize = 32;

/// Binary descriptor packed into 64-bit words for fast Hamming distances.
pub type PackedDescriptor = [u64; DESCRIPTOR_BYTES / 8];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub data: Vec<u8>,
}

impl Descriptor {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn hamming_distance(&self, other: &Descriptor) -> u32 {
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    /// Packs the first `DESCRIPTOR_BYTES` bytes little-endian; shorter
    /// descriptors are zero-padded.
    pub fn packed(&self) -> PackedDescriptor {
        let mut words = [0u64; DESCRIPTOR_BYTES / 8];
        for (i, &b) in self.data.iter().take(DESCRIPTOR_BYTES).enumerate() {
            words[i / 8] |= (b as u64) << (8 * (i % 8));
        }
        words
    }
}

pub fn packed_hamming(a: &PackedDescriptor, b: &PackedDescriptor) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

#[derive(Debug, Clone, Default)]
pub struct Descriptors {
    pub descriptors: Vec<Descriptor>,
}

impl Descriptors {
    pub fn new() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            descriptors: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, desc: Descriptor) {
        self.descriptors.push(desc);
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter()
    }

    pub fn packed(&self) -> Vec<PackedDescriptor> {
        self.descriptors.iter().map(Descriptor::packed).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_hamming_identical_is_zero() {
        let d = Descriptor::new(vec![0b10101010u8, 0b11110000, 0b00001111]);
        assert_eq!(d.hamming_distance(&d), 0);
    }

    #[test]
    fn descriptor_hamming_all_different_is_max() {
        let a = Descriptor::new(vec![0xFFu8; 4]);
        let b = Descriptor::new(vec![0x00u8; 4]);
        assert_eq!(a.hamming_distance(&b), 32);
    }

    #[test]
    fn packed_distance_matches_bytewise() {
        let a = Descriptor::new((0..32u8).map(|i| i.wrapping_mul(37)).collect());
        let b = Descriptor::new((0..32u8).map(|i| i.wrapping_mul(91) ^ 0x5A).collect());
        assert_eq!(packed_hamming(&a.packed(), &b.packed()), a.hamming_distance(&b));
    }

    #[test]
    fn descriptors_push_and_len() {
        let mut ds = Descriptors::new();
        ds.push(Descriptor::new(vec![0u8; DESCRIPTOR_BYTES]));
        assert_eq!(ds.len(), 1);
        assert!(!ds.is_empty());
        assert_eq!(ds.packed().len(), 1);
    }
}
