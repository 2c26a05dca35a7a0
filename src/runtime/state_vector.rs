//! The runtime data model produced by compiling a state vector config: a
//! contiguous byte buffer plus name-addressed [`Element`](super::element::Element)
//! and [`Region`] handles into it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::primitive::PrimitiveType;
use crate::runtime::element::ElementAccess;
use crate::runtime::lock::Lock;
use crate::runtime::region::Region;

/// The live state vector: a byte buffer shared by every element and region
/// handle that was minted when it was compiled.
pub struct StateVector {
    buffer: Rc<RefCell<Vec<u8>>>,
    elements: HashMap<String, Rc<dyn ElementAccess>>,
    regions: HashMap<String, Region>,
    lock: Option<Rc<dyn Lock>>,
}

impl StateVector {
    pub fn new(
        buffer: Rc<RefCell<Vec<u8>>>,
        elements: HashMap<String, Rc<dyn ElementAccess>>,
        regions: HashMap<String, Region>,
        lock: Option<Rc<dyn Lock>>,
    ) -> Self {
        Self {
            buffer,
            elements,
            regions,
            lock,
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.buffer.borrow().len()
    }

    pub fn lock(&self) -> Option<&Rc<dyn Lock>> {
        self.lock.as_ref()
    }

    pub fn element(&self, name: &str) -> Result<&Rc<dyn ElementAccess>, RuntimeError> {
        self.elements.get(name).ok_or_else(|| RuntimeError::Key(name.to_string()))
    }

    pub fn element_type(&self, name: &str) -> Result<PrimitiveType, RuntimeError> {
        self.element(name).map(|e| e.primitive_type())
    }

    pub fn region(&self, name: &str) -> Result<&Region, RuntimeError> {
        self.regions.get(name).ok_or_else(|| RuntimeError::Key(name.to_string()))
    }

    pub fn element_names(&self) -> impl Iterator<Item = &str> {
        self.elements.keys().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::element::Element;

    #[test]
    fn unknown_element_is_a_key_error() {
        let buffer = Rc::new(RefCell::new(vec![0u8; 4]));
        let sv = StateVector::new(buffer, HashMap::new(), HashMap::new(), None);
        assert!(matches!(sv.element("missing"), Err(RuntimeError::Key(_))));
    }

    #[test]
    fn known_element_reports_its_type() {
        let buffer = Rc::new(RefCell::new(vec![0u8; 4]));
        let el: Rc<dyn ElementAccess> = Rc::new(Element::<i32>::new("x", 0, PrimitiveType::I32, buffer.clone(), None));
        let mut elements: HashMap<String, Rc<dyn ElementAccess>> = HashMap::new();
        elements.insert("x".to_string(), el);
        let sv = StateVector::new(buffer, elements, HashMap::new(), None);
        assert_eq!(sv.element_type("x").unwrap(), PrimitiveType::I32);
    }
}
