//! Immutable cons lists. The empty list is a distinguished value (`List`
//! with no head), shared by construction rather than by allocation.

use std::sync::Arc;

use crate::value::Value;

#[derive(Clone, Debug, Default)]
pub struct List {
    head: Option<Arc<Pair>>,
}

#[derive(Debug)]
pub struct Pair {
    pub car: Value,
    pub cdr: List,
}

impl List {
    pub const fn empty() -> List {
        List { head: None }
    }

    pub fn cons(car: Value, cdr: List) -> List {
        List {
            head: Some(Arc::new(Pair { car, cdr })),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// First element, or null for the empty list.
    pub fn car(&self) -> Value {
        match &self.head {
            Some(pair) => pair.car.clone(),
            None => Value::Null,
        }
    }

    /// Rest of the list; the empty list's cdr is itself.
    pub fn cdr(&self) -> List {
        match &self.head {
            Some(pair) => pair.cdr.clone(),
            None => List::empty(),
        }
    }

    pub fn cadr(&self) -> Value {
        self.cdr().car()
    }

    pub fn cddr(&self) -> List {
        self.cdr().cdr()
    }

    pub fn caddr(&self) -> Value {
        self.cddr().car()
    }

    pub fn cdddr(&self) -> List {
        self.cddr().cdr()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            node: self.head.as_deref(),
        }
    }

    /// Identity of the first cell; the basis for `identical?` on lists.
    pub fn same_cells(&self, other: &List) -> bool {
        match (&self.head, &other.head) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn from_values(values: &[Value]) -> List {
        let mut lst = List::empty();
        for value in values.iter().rev() {
            lst = List::cons(value.clone(), lst);
        }
        lst
    }

    pub fn from_vec(values: Vec<Value>) -> List {
        let mut lst = List::empty();
        for value in values.into_iter().rev() {
            lst = List::cons(value, lst);
        }
        lst
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.iter().cloned().collect()
    }

    pub fn reverse(&self) -> List {
        let mut rev = List::empty();
        for value in self.iter() {
            rev = List::cons(value.clone(), rev);
        }
        rev
    }

    /// A list of `count` copies of `value`.
    pub fn repeated(count: usize, value: &Value) -> List {
        let mut lst = List::empty();
        for _ in 0..count {
            lst = List::cons(value.clone(), lst);
        }
        lst
    }

    pub fn concat(&self, tail: &List) -> List {
        let mut lst = tail.clone();
        for value in self.reverse().iter() {
            lst = List::cons(value.clone(), lst);
        }
        lst
    }

    pub fn equal(&self, other: &List) -> bool {
        let mut a = self.iter();
        let mut b = other.iter();
        loop {
            match (a.next(), b.next()) {
                (None, None) => return true,
                (Some(x), Some(y)) => {
                    if !x.equal(y) {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }
}

impl PartialEq for List {
    fn eq(&self, other: &List) -> bool {
        self.equal(other)
    }
}

pub struct Iter<'a> {
    node: Option<&'a Pair>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<&'a Value> {
        let pair = self.node?;
        self.node = pair.cdr.head.as_deref();
        Some(&pair.car)
    }
}

impl<'a> IntoIterator for &'a List {
    type Item = &'a Value;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

/// Build a list from the given values.
pub fn list(values: Vec<Value>) -> List {
    List::from_vec(values)
}
