use crate::Value;

/// Receives the outgoing references of an object.
pub trait Visitor {
    fn visit(&mut self, value: Value);
}

impl<F: FnMut(Value)> Visitor for F {
    #[inline]
    fn visit(&mut self, value: Value) {
        self(value)
    }
}

/// Objects that can enumerate the values they hold.
///
/// Visiting an object yields only its direct edges, inline values included;
/// the visitor decides what to do with heap references.
pub trait Visitable {
    fn visit_edges(&self, visitor: &mut impl Visitor);
}

impl Visitable for [Value] {
    #[inline]
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        self.iter().for_each(|&value| visitor.visit(value));
    }
}
