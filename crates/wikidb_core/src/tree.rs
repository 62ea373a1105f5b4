//! Pre-order flattening of page forests.

use std::iter::FusedIterator;
use std::slice;

use serde::Serialize;

use crate::model::Page;

/// An ordered forest of root pages, e.g. every top-level page of one wiki.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageCollection {
    roots: Vec<Page>,
}

impl PageCollection {
    pub fn new(roots: Vec<Page>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[Page] {
        &self.roots
    }

    pub fn into_roots(self) -> Vec<Page> {
        self.roots
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn extend(&mut self, pages: impl IntoIterator<Item = Page>) {
        self.roots.extend(pages);
    }

    /// Every page in pre-order. Each call starts a fresh pass at the first root.
    pub fn iter(&self) -> Flatten<'_> {
        flatten(&self.roots)
    }

    /// Like [`PageCollection::iter`], paired with each page's depth below its root.
    pub fn walk(&self) -> Walk<'_> {
        walk(&self.roots)
    }

    pub fn total_pages(&self) -> usize {
        self.iter().count()
    }
}

impl FromIterator<Page> for PageCollection {
    fn from_iter<T: IntoIterator<Item = Page>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a PageCollection {
    type Item = &'a Page;
    type IntoIter = Flatten<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub fn flatten(roots: &[Page]) -> Flatten<'_> {
    Flatten { inner: walk(roots) }
}

pub fn walk(roots: &[Page]) -> Walk<'_> {
    Walk {
        stack: vec![roots.iter()],
    }
}

/// Explicit-stack depth-first walk; one sibling cursor per open level.
#[derive(Debug, Clone)]
pub struct Walk<'a> {
    stack: Vec<slice::Iter<'a, Page>>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (usize, &'a Page);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let depth = self.stack.len().checked_sub(1)?;
            let siblings = self.stack.last_mut()?;
            match siblings.next() {
                Some(page) => {
                    if !page.children.is_empty() {
                        self.stack.push(page.children.iter());
                    }
                    return Some((depth, page));
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

impl FusedIterator for Walk<'_> {}

#[derive(Debug, Clone)]
pub struct Flatten<'a> {
    inner: Walk<'a>,
}

impl<'a> Iterator for Flatten<'a> {
    type Item = &'a Page;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, page)| page)
    }
}

impl FusedIterator for Flatten<'_> {}
