/// Automatically calls the enclosed function when dropped, unless disarmed
pub struct FnTrap<T: FnOnce()>(Option<T>);

impl<T: FnOnce()> FnTrap<T> {
    #[must_use]
    #[inline]
    pub fn new(f: T) -> Self {
        Self(Some(f))
    }

    #[inline]
    pub fn disarm(mut self) {
        self.0 = None;
    }
}

impl<T: FnOnce()> Drop for FnTrap<T> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

#[derive(Display, PartialEq, Eq)]
#[display("{:?}", self)]
/// Outputs bytes as escaped ascii strings, long inputs are cut short
pub struct EscapedBytes<'a>(pub &'a [u8]);

impl EscapedBytes<'_> {
    const MAX_SHOWN: usize = 64;
}

impl std::fmt::Debug for EscapedBytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shown = self.0.len().min(Self::MAX_SHOWN);
        for &b in &self.0[..shown] {
            write!(f, "{}", std::ascii::escape_default(b))?
        }
        if shown != self.0.len() {
            write!(f, "...+{}B", self.0.len() - shown)?;
        }
        Ok(())
    }
}

#[derive(Display)]
#[display("{:?}", self)]
/// Outputs bytes sizes as human sizes
pub struct ByteSize(pub u64);

impl std::fmt::Debug for ByteSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const KB: u64 = 1024;
        const MB: u64 = 1024 * 1024;
        let (value, suffix) = match self.0 {
            v @ 0..KB => (v as f64, "B"),
            v @ KB..MB => (v as f64 / KB as f64, "KB"),
            v @ MB.. => (v as f64 / MB as f64, "MB"),
        };
        write!(f, "{value:.3}{suffix}")
    }
}
