//! Typed and type-erased access to a single value living in a
//! [`StateVector`](super::state_vector::StateVector) byte buffer.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::cast::Tagged;
use crate::primitive::PrimitiveType;
use crate::runtime::lock::Lock;

/// Type-erased read/write access to one element, used by the expression
/// compiler and runtime where the element's native type is not known until
/// the state vector is compiled.
pub trait ElementAccess {
    fn name(&self) -> &str;
    fn primitive_type(&self) -> PrimitiveType;
    /// Byte offset of this element within the state vector's shared buffer.
    fn offset(&self) -> usize;
    fn read(&self) -> Tagged;
    fn write(&self, value: Tagged);

    fn read_f64(&self) -> f64 {
        self.read().to_f64()
    }

    fn write_f64(&self, v: f64) {
        self.write(Tagged::from_f64(self.primitive_type(), v));
    }
}

impl fmt::Debug for dyn ElementAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Element({}: {:?})", self.name(), self.primitive_type())
    }
}

/// A handle into a shared byte buffer at a fixed offset, typed `T` for
/// callers that know the element's type at compile time.
pub struct Element<T> {
    name: String,
    offset: usize,
    ty: PrimitiveType,
    buffer: Rc<RefCell<Vec<u8>>>,
    lock: Option<Rc<dyn Lock>>,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Element<T> {
    pub fn new(
        name: impl Into<String>,
        offset: usize,
        ty: PrimitiveType,
        buffer: Rc<RefCell<Vec<u8>>>,
        lock: Option<Rc<dyn Lock>>,
    ) -> Self {
        Self {
            name: name.into(),
            offset,
            ty,
            buffer,
            lock,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<T> ElementAccess for Element<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn primitive_type(&self) -> PrimitiveType {
        self.ty
    }

    fn offset(&self) -> usize {
        self.offset
    }

    fn read(&self) -> Tagged {
        let _guard = self.lock.as_ref().map(|l| l.acquire());
        let buf = self.buffer.borrow();
        let size = self.ty.size_bytes();
        Tagged::from_bytes(self.ty, &buf[self.offset..self.offset + size])
    }

    fn write(&self, value: Tagged) {
        let _guard = self.lock.as_ref().map(|l| l.acquire());
        let mut buf = self.buffer.borrow_mut();
        let size = self.ty.size_bytes();
        value.to_bytes(&mut buf[self.offset..self.offset + size]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_read_after_write_round_trips() {
        let buffer = Rc::new(RefCell::new(vec![0u8; 4]));
        let el: Element<i32> = Element::new("x", 0, PrimitiveType::I32, buffer, None);
        el.write_f64(42.0);
        assert_eq!(el.read_f64(), 42.0);
    }

    #[test]
    fn write_saturates_to_element_type() {
        let buffer = Rc::new(RefCell::new(vec![0u8; 1]));
        let el: Element<u8> = Element::new("y", 0, PrimitiveType::U8, buffer, None);
        el.write_f64(1000.0);
        assert_eq!(el.read_f64(), 255.0);
    }
}
