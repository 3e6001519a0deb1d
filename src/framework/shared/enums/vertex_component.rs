/// 頂点の属性。パイプラインの頂点入力を組み立てる時に使う。<br />
/// Vertex attributes, used when assembling a pipeline's vertex input.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum VertexComponent {
    Position,
    Normal,
    UV,
    Color,
    Tangent,
    Joint0,
    Weight0,
}
