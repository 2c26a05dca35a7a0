//! A named contiguous span of a state vector's byte buffer, used for bulk
//! network transport (send one region, not the whole vector).

use std::cell::RefCell;
use std::rc::Rc;

#[derive(Clone)]
pub struct Region {
    name: String,
    offset: usize,
    size: usize,
    buffer: Rc<RefCell<Vec<u8>>>,
}

impl Region {
    pub fn new(name: impl Into<String>, offset: usize, size: usize, buffer: Rc<RefCell<Vec<u8>>>) -> Self {
        Self {
            name: name.into(),
            offset,
            size,
            buffer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn copy_out(&self, dst: &mut [u8]) {
        let buf = self.buffer.borrow();
        dst[..self.size].copy_from_slice(&buf[self.offset..self.offset + self.size]);
    }

    pub fn copy_in(&self, src: &[u8]) {
        let mut buf = self.buffer.borrow_mut();
        buf[self.offset..self.offset + self.size].copy_from_slice(&src[..self.size]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_out_then_copy_in_round_trips() {
        let buffer = Rc::new(RefCell::new(vec![1, 2, 3, 4]));
        let region = Region::new("r", 1, 2, buffer.clone());
        let mut out = [0u8; 2];
        region.copy_out(&mut out);
        assert_eq!(out, [2, 3]);

        region.copy_in(&[9, 9]);
        assert_eq!(&buffer.borrow()[1..3], &[9, 9]);
    }
}
