//! Detector setup: an arena of setup elements with module and sensor lookup.
//!
//! The context is built once, prepared, and then passed by reference to every
//! stage of the pipeline. Elements refer to each other by [`ElementId`].

use crate::address::{ElementLevel, Side, StsAddress};
use crate::error::{Error, Result};
use crate::geometry::{SensorConditions, SensorDssd, SensorGeometry, SensorTransform};
use crate::params::ModuleParams;
use std::collections::BTreeMap;

/// Index of an element in the setup arena.
pub type ElementId = usize;

/// One node of the setup hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct SetupElement {
    /// Element address.
    pub address: StsAddress,
    /// Hierarchy level.
    pub level: ElementLevel,
    /// Enclosing element.
    pub parent: Option<ElementId>,
    /// Daughter elements, in insertion order.
    pub children: Vec<ElementId>,
}

/// A readout module with its daisy chain of sensors.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    /// Arena element.
    pub element: ElementId,
    /// Module address.
    pub address: StsAddress,
    /// ASIC and channel parameters.
    pub params: ModuleParams,
    /// Sensor slots in daisy-chain order.
    pub sensors: Vec<usize>,
}

/// A sensor as registered in the setup.
#[derive(Debug, Clone)]
pub struct SensorDescriptor {
    /// Arena element.
    pub element: ElementId,
    /// Sensor address.
    pub address: StsAddress,
    /// Module slot.
    pub module: usize,
    /// Static geometry.
    pub geometry: SensorGeometry,
    /// Operating conditions.
    pub conditions: SensorConditions,
    /// Local → global transform.
    pub transform: SensorTransform,
    prepared: Option<SensorDssd>,
}

impl SensorDescriptor {
    /// Derived parameters, if [`DetectorContext::prepare`] has run.
    #[must_use]
    pub fn prepared(&self) -> Option<&SensorDssd> {
        self.prepared.as_ref()
    }
}

/// Explicit detector setup.
#[derive(Debug, Clone, Default)]
pub struct DetectorContext {
    elements: Vec<SetupElement>,
    element_index: BTreeMap<(ElementLevel, StsAddress), ElementId>,
    modules: Vec<ModuleDescriptor>,
    module_index: BTreeMap<StsAddress, usize>,
    sensors: Vec<SensorDescriptor>,
    sensor_index: BTreeMap<StsAddress, usize>,
}

impl DetectorContext {
    /// Creates an empty setup.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_element(&mut self, address: StsAddress, level: ElementLevel) -> ElementId {
        let address = address.at_level(level);
        if let Some(&id) = self.element_index.get(&(level, address)) {
            return id;
        }
        let parent = level
            .parent()
            .map(|parent_level| self.ensure_element(address, parent_level));
        let id = self.elements.len();
        self.elements.push(SetupElement {
            address,
            level,
            parent,
            children: Vec::new(),
        });
        if let Some(parent) = parent {
            self.elements[parent].children.push(id);
        }
        self.element_index.insert((level, address), id);
        id
    }

    /// Registers a module, creating its unit/ladder ancestors as needed.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateAddress`] if the module already exists.
    pub fn add_module(&mut self, address: StsAddress, params: ModuleParams) -> Result<usize> {
        let address = address.module_address();
        if self.module_index.contains_key(&address) {
            return Err(Error::DuplicateAddress(address.raw()));
        }
        let element = self.ensure_element(address, ElementLevel::Module);
        let slot = self.modules.len();
        self.modules.push(ModuleDescriptor {
            element,
            address,
            params,
            sensors: Vec::new(),
        });
        self.module_index.insert(address, slot);
        Ok(slot)
    }

    /// Appends a sensor to the end of a module's daisy chain.
    ///
    /// Returns the new sensor address.
    ///
    /// # Errors
    /// Returns [`Error::UnknownModule`] or an address overflow error.
    pub fn add_sensor(
        &mut self,
        module: StsAddress,
        geometry: SensorGeometry,
        conditions: SensorConditions,
        transform: SensorTransform,
    ) -> Result<StsAddress> {
        let module = module.module_address();
        let module_slot = *self
            .module_index
            .get(&module)
            .ok_or(Error::UnknownModule(module.raw()))?;
        let number = self.modules[module_slot].sensors.len();
        let address = module
            .with_sensor(u32::try_from(number).unwrap_or(u32::MAX))?
            .at_level(ElementLevel::Sensor);
        let element = self.ensure_element(address, ElementLevel::Sensor);
        let slot = self.sensors.len();
        self.sensors.push(SensorDescriptor {
            element,
            address,
            module: module_slot,
            geometry,
            conditions,
            transform,
            prepared: None,
        });
        self.sensor_index.insert(address, slot);
        self.modules[module_slot].sensors.push(slot);
        Ok(address)
    }

    /// Computes derived parameters of every sensor.
    ///
    /// # Errors
    /// Returns the first configuration error found.
    pub fn prepare(&mut self) -> Result<()> {
        for module in &self.modules {
            let channels_per_side = module.params.channels_per_side();
            for (index, &slot) in module.sensors.iter().enumerate() {
                let sensor = &mut self.sensors[slot];
                let index = u16::try_from(index)
                    .map_err(|_| Error::invalid("sensors", "daisy chain too long"))?;
                let lorentz = sensor.prepared.as_ref().map_or([0.0; 2], |p| {
                    [p.lorentz_shift(Side::Front), p.lorentz_shift(Side::Back)]
                });
                let mut dssd = SensorDssd::prepare(
                    sensor.geometry,
                    sensor.conditions,
                    index,
                    channels_per_side,
                )?;
                dssd.set_lorentz_shift(lorentz);
                sensor.prepared = Some(dssd);
            }
        }
        Ok(())
    }

    /// Sets the mean Lorentz shift subtracted by hit reconstruction.
    ///
    /// # Errors
    /// Returns [`Error::UnknownSensor`] or [`Error::SensorNotPrepared`].
    pub fn set_lorentz_correction(&mut self, sensor: StsAddress, shift: [f64; 2]) -> Result<()> {
        let slot = self.sensor_slot(sensor)?;
        let address = self.sensors[slot].address;
        self.sensors[slot]
            .prepared
            .as_mut()
            .ok_or(Error::SensorNotPrepared(address.raw()))?
            .set_lorentz_shift(shift);
        Ok(())
    }

    fn sensor_slot(&self, sensor: StsAddress) -> Result<usize> {
        let key = sensor.at_level(ElementLevel::Sensor);
        self.sensor_index
            .get(&key)
            .copied()
            .ok_or(Error::UnknownSensor(key.raw()))
    }

    /// All setup elements.
    #[must_use]
    pub fn elements(&self) -> &[SetupElement] {
        &self.elements
    }

    /// Element by id.
    #[must_use]
    pub fn element(&self, id: ElementId) -> Option<&SetupElement> {
        self.elements.get(id)
    }

    /// Element at `level` containing `address`.
    #[must_use]
    pub fn find_element(&self, address: StsAddress, level: ElementLevel) -> Option<ElementId> {
        self.element_index
            .get(&(level, address.at_level(level)))
            .copied()
    }

    /// All modules in registration order.
    #[must_use]
    pub fn modules(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    /// All sensors in registration order.
    #[must_use]
    pub fn sensors(&self) -> &[SensorDescriptor] {
        &self.sensors
    }

    /// Module containing `address`.
    ///
    /// # Errors
    /// Returns [`Error::UnknownModule`].
    pub fn module(&self, address: StsAddress) -> Result<&ModuleDescriptor> {
        let key = address.module_address();
        self.module_index
            .get(&key)
            .map(|&slot| &self.modules[slot])
            .ok_or(Error::UnknownModule(key.raw()))
    }

    /// Slot of the module containing `address` in [`Self::modules`].
    #[must_use]
    pub fn module_slot(&self, address: StsAddress) -> Option<usize> {
        self.module_index.get(&address.module_address()).copied()
    }

    /// Sensor with `address` (side field ignored).
    ///
    /// # Errors
    /// Returns [`Error::UnknownSensor`].
    pub fn sensor(&self, address: StsAddress) -> Result<&SensorDescriptor> {
        self.sensor_slot(address).map(|slot| &self.sensors[slot])
    }

    /// Prepared parameters of a sensor.
    ///
    /// # Errors
    /// Returns [`Error::UnknownSensor`] or [`Error::SensorNotPrepared`].
    pub fn sensor_dssd(&self, address: StsAddress) -> Result<&SensorDssd> {
        let sensor = self.sensor(address)?;
        sensor
            .prepared
            .as_ref()
            .ok_or(Error::SensorNotPrepared(sensor.address.raw()))
    }

    /// Sensors of a module in daisy-chain order.
    ///
    /// # Errors
    /// Returns [`Error::UnknownModule`].
    pub fn module_sensors(
        &self,
        module: StsAddress,
    ) -> Result<impl Iterator<Item = &SensorDescriptor> + '_> {
        let module = self.module(module)?;
        Ok(module.sensors.iter().map(move |&slot| &self.sensors[slot]))
    }

    /// Number of modules.
    #[must_use]
    pub fn nof_modules(&self) -> usize {
        self.modules.len()
    }

    /// Number of sensors.
    #[must_use]
    pub fn nof_sensors(&self) -> usize {
        self.sensors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::AsicParams;

    fn module_params() -> ModuleParams {
        ModuleParams::with_asic(AsicParams::default()).unwrap()
    }

    fn geometry() -> SensorGeometry {
        SensorGeometry::stereo_default(0.0058 * 1024.0, 4.0)
    }

    #[test]
    fn test_hierarchy() {
        let mut ctx = DetectorContext::new();
        let m0 = StsAddress::module(1, 2, 0, 0).unwrap();
        let m1 = StsAddress::module(1, 2, 0, 1).unwrap();
        ctx.add_module(m0, module_params()).unwrap();
        ctx.add_module(m1, module_params()).unwrap();
        assert!(ctx.add_module(m1, module_params()).is_err());

        // unit, ladder, half-ladder shared by both modules
        assert_eq!(ctx.elements().len(), 5);
        let ladder = ctx.find_element(m0, ElementLevel::Ladder).unwrap();
        let half = ctx.find_element(m0, ElementLevel::HalfLadder).unwrap();
        assert_eq!(ctx.element(half).unwrap().parent, Some(ladder));
        assert_eq!(ctx.element(half).unwrap().children.len(), 2);
    }

    #[test]
    fn test_sensor_lookup_requires_prepare() {
        let mut ctx = DetectorContext::new();
        let module = StsAddress::module(0, 0, 0, 3).unwrap();
        ctx.add_module(module, module_params()).unwrap();
        let s0 = ctx
            .add_sensor(module, geometry(), SensorConditions::default(), SensorTransform::identity())
            .unwrap();
        let s1 = ctx
            .add_sensor(module, geometry(), SensorConditions::default(), SensorTransform::identity())
            .unwrap();
        assert_eq!(s0.sensor(), 0);
        assert_eq!(s1.sensor(), 1);
        assert_eq!(s1.module_address(), module);

        assert!(matches!(ctx.sensor_dssd(s0), Err(Error::SensorNotPrepared(_))));
        ctx.prepare().unwrap();
        assert_eq!(ctx.sensor_dssd(s1).unwrap().index(), 1);
        assert_eq!(ctx.module_sensors(module).unwrap().count(), 2);

        ctx.set_lorentz_correction(s0.with_side(Side::Back), [1.0e-4, -2.0e-4])
            .unwrap();
        assert!((ctx.sensor_dssd(s0).unwrap().lorentz_shift(Side::Back) + 2.0e-4).abs() < 1e-15);
    }

    #[test]
    fn test_unknown_addresses() {
        let mut ctx = DetectorContext::new();
        let module = StsAddress::module(0, 0, 0, 0).unwrap();
        assert!(matches!(ctx.module(module), Err(Error::UnknownModule(_))));
        assert!(ctx
            .add_sensor(module, geometry(), SensorConditions::default(), SensorTransform::identity())
            .is_err());
        ctx.add_module(module, module_params()).unwrap();
        let other = StsAddress::module(0, 0, 0, 1).unwrap().with_sensor(0).unwrap();
        assert!(matches!(ctx.sensor(other), Err(Error::UnknownSensor(_))));
    }
}
