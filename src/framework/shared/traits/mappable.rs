pub trait Mappable {
    fn map_memory(&mut self) -> anyhow::Result<*mut u8>;
    fn unmap_memory(&mut self);
}
