pub trait Disposable: Drop {
    fn dispose(&mut self);
    fn is_disposed(&self) -> bool;
}
