//! Визуальная иерархия агента (узлы + renderers + материалы)
//!
//! Рендеринг живёт снаружи; здесь только данные, которые presentation
//! анимирует: локальные трансформы узлов и per-renderer material overrides.

use bevy::prelude::*;

/// Параметры shared material (None → свойства у шейдера нет)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SharedMaterial {
    pub color: Option<Vec4>,
    pub emission: Option<Vec4>,
}

/// Per-renderer overrides поверх shared material
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MaterialOverrides {
    pub color: Option<Vec4>,
    pub emission: Option<Vec4>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Renderer {
    pub material: SharedMaterial,
    pub overrides: MaterialOverrides,
    pub visible: bool,
}

impl Renderer {
    pub fn new(material: SharedMaterial) -> Self {
        Self {
            material,
            overrides: MaterialOverrides::default(),
            visible: true,
        }
    }

    pub fn effective_color(&self) -> Option<Vec4> {
        self.overrides.color.or(self.material.color)
    }

    pub fn effective_emission(&self) -> Option<Vec4> {
        self.overrides.emission.or(self.material.emission)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisualNode {
    pub name: String,
    pub parent: Option<usize>,
    pub local: Transform,
    pub renderers: Vec<Renderer>,
}

/// Куда применяется анимация смерти
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentationRoot {
    /// Трансформ самого агента
    Agent,
    Node(usize),
}

/// Адрес renderer'а в rig
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RendererRef {
    pub node: usize,
    pub index: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisualRig {
    nodes: Vec<VisualNode>,
    root_override: Option<usize>,
}

impl VisualRig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавить узел; `parent = None` → прямой потомок агента
    pub fn add_node(&mut self, name: impl Into<String>, parent: Option<usize>, local: Transform) -> usize {
        let parent = parent.filter(|p| *p < self.nodes.len());
        self.nodes.push(VisualNode {
            name: name.into(),
            parent,
            local,
            renderers: Vec::new(),
        });
        self.nodes.len() - 1
    }

    pub fn add_renderer(&mut self, node: usize, material: SharedMaterial) -> Option<RendererRef> {
        let target = self.nodes.get_mut(node)?;
        target.renderers.push(Renderer::new(material));
        Some(RendererRef {
            node,
            index: target.renderers.len() - 1,
        })
    }

    /// Явный root (невалидный индекс игнорируется при resolve)
    pub fn set_root_override(&mut self, node: Option<usize>) {
        self.root_override = node;
    }

    pub fn nodes(&self) -> &[VisualNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&VisualNode> {
        self.nodes.get(index)
    }

    pub fn node_mut(&mut self, index: usize) -> Option<&mut VisualNode> {
        self.nodes.get_mut(index)
    }

    pub fn renderer(&self, at: RendererRef) -> Option<&Renderer> {
        self.nodes.get(at.node)?.renderers.get(at.index)
    }

    pub fn renderer_mut(&mut self, at: RendererRef) -> Option<&mut Renderer> {
        self.nodes.get_mut(at.node)?.renderers.get_mut(at.index)
    }

    fn is_descendant(&self, node: usize, ancestor: usize) -> bool {
        let mut current = Some(node);
        // глубина ограничена числом узлов (защита от циклов)
        for _ in 0..=self.nodes.len() {
            match current {
                Some(c) if c == ancestor => return true,
                Some(c) => current = self.nodes.get(c).and_then(|n| n.parent),
                None => return false,
            }
        }
        false
    }

    fn subtree_has_renderer(&self, root: usize) -> bool {
        (0..self.nodes.len())
            .any(|i| !self.nodes[i].renderers.is_empty() && self.is_descendant(i, root))
    }

    /// Override → первый прямой потомок с renderer в поддереве → сам агент
    pub fn resolve_root(&self) -> PresentationRoot {
        if let Some(node) = self.root_override.filter(|n| *n < self.nodes.len()) {
            return PresentationRoot::Node(node);
        }
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(i, _)| i)
            .find(|i| self.subtree_has_renderer(*i))
            .map_or(PresentationRoot::Agent, PresentationRoot::Node)
    }

    /// Все renderers под root (для Agent — все)
    pub fn renderers_under(&self, root: PresentationRoot) -> Vec<RendererRef> {
        let mut refs = Vec::new();
        for (node_index, node) in self.nodes.iter().enumerate() {
            let included = match root {
                PresentationRoot::Agent => true,
                PresentationRoot::Node(r) => self.is_descendant(node_index, r),
            };
            if !included {
                continue;
            }
            for index in 0..node.renderers.len() {
                refs.push(RendererRef {
                    node: node_index,
                    index,
                });
            }
        }
        refs
    }

    pub fn renderer_count(&self) -> usize {
        self.nodes.iter().map(|n| n.renderers.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glowing() -> SharedMaterial {
        SharedMaterial {
            color: Some(Vec4::ONE),
            emission: Some(Vec4::new(0.2, 0.2, 0.2, 1.0)),
        }
    }

    #[test]
    fn test_root_resolution_order() {
        let mut rig = VisualRig::new();
        assert_eq!(rig.resolve_root(), PresentationRoot::Agent);

        let socket = rig.add_node("socket", None, Transform::IDENTITY);
        let body = rig.add_node("body", None, Transform::IDENTITY);
        let mesh = rig.add_node("mesh", Some(body), Transform::IDENTITY);
        rig.add_renderer(mesh, glowing());

        assert_eq!(rig.resolve_root(), PresentationRoot::Node(body));

        rig.set_root_override(Some(socket));
        assert_eq!(rig.resolve_root(), PresentationRoot::Node(socket));

        rig.set_root_override(Some(99));
        assert_eq!(rig.resolve_root(), PresentationRoot::Node(body));
    }

    #[test]
    fn test_renderers_under_subtree() {
        let mut rig = VisualRig::new();
        let a = rig.add_node("a", None, Transform::IDENTITY);
        let b = rig.add_node("b", None, Transform::IDENTITY);
        let a_child = rig.add_node("a/child", Some(a), Transform::IDENTITY);
        rig.add_renderer(a_child, glowing());
        rig.add_renderer(b, glowing());

        assert_eq!(rig.renderers_under(PresentationRoot::Node(a)).len(), 1);
        assert_eq!(rig.renderers_under(PresentationRoot::Agent).len(), 2);
    }

    #[test]
    fn test_override_wins_over_shared() {
        let mut renderer = Renderer::new(glowing());
        renderer.overrides.color = Some(Vec4::new(1.0, 0.0, 0.0, 0.5));
        assert_eq!(renderer.effective_color(), Some(Vec4::new(1.0, 0.0, 0.0, 0.5)));
        assert_eq!(renderer.effective_emission(), glowing().emission);
    }
}
