#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CameraType {
    LookAt,
    FirstPerson,
}
