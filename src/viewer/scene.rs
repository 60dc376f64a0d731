use cgmath::{Matrix4, One, Point3, Quaternion, Vector3};

/// Local translation, rotation and scale of a scene node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::one(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    pub fn matrix(&self) -> Matrix4<f32> {
        let t = Matrix4::from_translation(self.position);
        let r = Matrix4::from(self.rotation);
        let s = Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z);
        t * r * s // Order matters: T * R * S
    }
}

/// Vertex positions plus an optional index buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub positions: Vec<[f32; 3]>,
    pub indices: Option<Vec<u32>>,
}

impl Geometry {
    pub fn new(positions: Vec<[f32; 3]>, indices: Option<Vec<u32>>) -> Self {
        Self { positions, indices }
    }

    /// Number of entries in the position attribute.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn index_count(&self) -> Option<usize> {
        self.indices.as_ref().map(Vec::len)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub color: u32,
    pub wireframe: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            color: 0xcccccc,
            wireframe: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub geometry: Geometry,
    pub material: Material,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

impl Mesh {
    pub fn new(geometry: Geometry, material: Material) -> Self {
        Self {
            geometry,
            material,
            cast_shadow: false,
            receive_shadow: false,
        }
    }
}

/// A node in a loaded model's object graph.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub name: String,
    pub transform: Transform,
    pub mesh: Option<Mesh>,
    pub children: Vec<SceneObject>,
}

impl SceneObject {
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::default(),
            mesh: None,
            children: Vec::new(),
        }
    }

    pub fn with_mesh(name: impl Into<String>, mesh: Mesh) -> Self {
        Self {
            mesh: Some(mesh),
            ..Self::group(name)
        }
    }

    pub fn with_child(mut self, child: SceneObject) -> Self {
        self.children.push(child);
        self
    }

    /// Depth-first visit of every mesh together with its world matrix.
    pub fn visit_meshes<F>(&self, f: &mut F)
    where
        F: FnMut(&Mesh, &Matrix4<f32>),
    {
        self.visit_meshes_from(&Matrix4::one(), f);
    }

    fn visit_meshes_from<F>(&self, parent: &Matrix4<f32>, f: &mut F)
    where
        F: FnMut(&Mesh, &Matrix4<f32>),
    {
        let world = parent * self.transform.matrix();
        if let Some(ref mesh) = self.mesh {
            f(mesh, &world);
        }
        for child in &self.children {
            child.visit_meshes_from(&world, f);
        }
    }

    pub fn visit_meshes_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut Mesh),
    {
        if let Some(ref mut mesh) = self.mesh {
            f(mesh);
        }
        for child in &mut self.children {
            child.visit_meshes_mut(f);
        }
    }

    pub fn mesh_count(&self) -> usize {
        let mut count = 0;
        self.visit_meshes(&mut |_, _| count += 1);
        count
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Light {
    Ambient {
        color: u32,
        intensity: f32,
    },
    Directional {
        color: u32,
        intensity: f32,
        position: Point3<f32>,
        cast_shadow: bool,
        shadow_map_size: u32,
    },
    /// Sky/ground fill light.
    Hemisphere {
        sky_color: u32,
        ground_color: u32,
        intensity: f32,
    },
}

/// Renderer-wide options fixed at mount time.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub antialias: bool,
    pub shadows: bool,
    pub tone_mapping_exposure: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            antialias: true,
            shadows: true,
            tone_mapping_exposure: 1.0,
        }
    }
}

/// Everything a renderer draws: background, lights, the ground reference and
/// at most one model.
#[derive(Debug, Clone)]
pub struct Scene {
    pub background: u32,
    pub lights: Vec<Light>,
    pub ground: SceneObject,
    model: Option<SceneObject>,
}

impl Scene {
    /// Viewer stage: ambient, key and fill lights over a 20x20 ground plane.
    pub fn stage() -> Self {
        let half = 10.0;
        let ground_geometry = Geometry::new(
            vec![
                [-half, 0.0, -half],
                [half, 0.0, -half],
                [half, 0.0, half],
                [-half, 0.0, half],
            ],
            Some(vec![0, 2, 1, 0, 3, 2]),
        );
        let mut ground_mesh = Mesh::new(
            ground_geometry,
            Material {
                name: "ground".to_string(),
                color: 0x333333,
                wireframe: false,
            },
        );
        ground_mesh.receive_shadow = true;

        Self {
            background: 0x1a1a1a,
            lights: vec![
                Light::Ambient {
                    color: 0x404040,
                    intensity: 0.6,
                },
                Light::Directional {
                    color: 0xffffff,
                    intensity: 0.8,
                    position: Point3::new(10.0, 10.0, 5.0),
                    cast_shadow: true,
                    shadow_map_size: 2048,
                },
                Light::Hemisphere {
                    sky_color: 0x87ceeb,
                    ground_color: 0x8b4513,
                    intensity: 0.3,
                },
            ],
            ground: SceneObject::with_mesh("ground", ground_mesh),
            model: None,
        }
    }

    pub fn model(&self) -> Option<&SceneObject> {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut SceneObject> {
        self.model.as_mut()
    }

    /// Attach a model, handing back the one it replaced.
    pub fn attach(&mut self, model: SceneObject) -> Option<SceneObject> {
        self.model.replace(model)
    }

    pub fn detach(&mut self) -> Option<SceneObject> {
        self.model.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visits_nested_meshes_with_composed_transforms() {
        let mesh = Mesh::new(Geometry::new(vec![[1.0, 0.0, 0.0]], None), Material::default());
        let mut child = SceneObject::with_mesh("child", mesh);
        child.transform.position = Vector3::new(0.0, 2.0, 0.0);

        let mut root = SceneObject::group("root").with_child(child);
        root.transform.scale = Vector3::new(2.0, 2.0, 2.0);

        let mut seen = Vec::new();
        root.visit_meshes(&mut |mesh, world| {
            let p = mesh.geometry.positions[0];
            let out = world * cgmath::Vector4::new(p[0], p[1], p[2], 1.0);
            seen.push((out.x, out.y, out.z));
        });
        assert_eq!(seen, vec![(2.0, 4.0, 0.0)]);
    }

    #[test]
    fn attach_replaces_previous_model() {
        let mut scene = Scene::stage();
        assert!(scene.attach(SceneObject::group("a")).is_none());
        let previous = scene.attach(SceneObject::group("b")).unwrap();
        assert_eq!(previous.name, "a");
        assert_eq!(scene.model().unwrap().name, "b");
        assert_eq!(scene.detach().unwrap().name, "b");
        assert!(scene.model().is_none());
    }

    #[test]
    fn stage_has_three_lights_and_shadowed_ground() {
        let scene = Scene::stage();
        assert_eq!(scene.lights.len(), 3);
        assert!(scene.ground.mesh.as_ref().unwrap().receive_shadow);
    }
}
