use super::{NetlistRenderer, SimulationSettings};
use crate::core::{CircuitSpec, ComponentKind, ParameterSet};
use std::fmt::Write;

/// Renders JoSIM-flavoured SPICE netlists.
///
/// Every component hangs between its own node and ground: capacitor `i`,
/// junction `i` and inductor `i` share node `i`. Phase offsets are cycled
/// over the junctions.
#[derive(Clone, Debug)]
pub struct SpiceRenderer {
    transient: String,
    junction_model: String,
}

impl SpiceRenderer {
    pub fn new(settings: &SimulationSettings) -> Self {
        Self {
            transient: settings.transient.clone(),
            junction_model: settings.junction_model.clone(),
        }
    }
}

impl Default for SpiceRenderer {
    fn default() -> Self {
        Self::new(&SimulationSettings::default())
    }
}

/// Collect the values of every group of one kind, in declaration order
fn values_of_kind(circuit: &CircuitSpec, parameters: &ParameterSet, kind: ComponentKind) -> Vec<f64> {
    circuit
        .groups()
        .filter(|(_, spec)| spec.kind == kind)
        .filter_map(|(name, _)| parameters.get(name))
        .flat_map(|values| values.iter().copied())
        .collect()
}

impl NetlistRenderer for SpiceRenderer {
    fn render(&self, circuit: &CircuitSpec, parameters: &ParameterSet) -> String {
        let capacitors = values_of_kind(circuit, parameters, ComponentKind::Capacitor);
        let junctions = values_of_kind(circuit, parameters, ComponentKind::Junction);
        let inductors = values_of_kind(circuit, parameters, ComponentKind::Inductor);
        let phases = values_of_kind(circuit, parameters, ComponentKind::PhaseOffset);

        // writeln! into a String cannot fail
        let mut netlist = String::from("* SPICE Netlist for JoSIM\n");

        for (i, c) in capacitors.iter().enumerate() {
            let _ = writeln!(netlist, "C{} 0 {} {:.2}pF", i + 1, i + 1, c);
        }

        for (i, icrit) in junctions.iter().enumerate() {
            let phase = if phases.is_empty() { 0.0 } else { phases[i % phases.len()] };
            let _ = writeln!(
                netlist,
                "JJ{} {} 0 type=JJ model='JJMODEL' icrit={:.2}uA PHI={}",
                i + 1,
                i + 1,
                icrit,
                phase
            );
        }

        for (i, l) in inductors.iter().enumerate() {
            let _ = writeln!(netlist, "L{} {} 0 {:.2}nH", i + 1, i + 1, l);
        }

        if !junctions.is_empty() {
            netlist.push_str(&self.junction_model);
            netlist.push('\n');
        }
        for i in 0..junctions.len() {
            let _ = writeln!(netlist, ".print p(JJ{})", i + 1);
        }

        netlist.push_str(&self.transient);
        netlist.push('\n');
        netlist.push_str(".end\n");
        netlist
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GroupSpec;

    fn circuit() -> CircuitSpec {
        CircuitSpec::new()
            .with_group("c_specs", GroupSpec::range(ComponentKind::Capacitor, 2, 1.0, 100.0))
            .with_group("j_specs", GroupSpec::range(ComponentKind::Junction, 3, 99.0, 1982.0))
            .with_group("l_specs", GroupSpec::range(ComponentKind::Inductor, 1, 75.0, 300.0))
            .with_group(
                "phiOffs_specs",
                GroupSpec::discrete(ComponentKind::PhaseOffset, 2, vec![0.0, 0.5]),
            )
    }

    #[test]
    fn test_render_uses_candidate_values() {
        let params = circuit().assemble(&[12.346, 50.0, 100.0, 200.0, 300.0, 80.0, 0.5, 0.0]);
        let netlist = SpiceRenderer::default().render(&circuit(), &params);
        let lines: Vec<&str> = netlist.lines().collect();

        assert_eq!(lines[0], "* SPICE Netlist for JoSIM");
        assert_eq!(lines[1], "C1 0 1 12.35pF");
        assert_eq!(lines[2], "C2 0 2 50.00pF");
        assert_eq!(lines[3], "JJ1 1 0 type=JJ model='JJMODEL' icrit=100.00uA PHI=0.5");
        assert_eq!(lines[4], "JJ2 2 0 type=JJ model='JJMODEL' icrit=200.00uA PHI=0");
        // phases wrap around when there are more junctions than offsets
        assert_eq!(lines[5], "JJ3 3 0 type=JJ model='JJMODEL' icrit=300.00uA PHI=0.5");
        assert_eq!(lines[6], "L1 1 0 80.00nH");
        assert!(lines[7].starts_with(".model JJMODEL"));
        assert_eq!(&lines[8..11], &[".print p(JJ1)", ".print p(JJ2)", ".print p(JJ3)"]);
        assert_eq!(lines[11], ".tran 0.1ns 100ns");
        assert_eq!(lines[12], ".end");
    }

    #[test]
    fn test_render_without_junctions_skips_model() {
        let spec = CircuitSpec::new().with_group("c", GroupSpec::range(ComponentKind::Capacitor, 1, 1.0, 2.0));
        let params = spec.assemble(&[1.5]);
        let netlist = SpiceRenderer::default().render(&spec, &params);
        assert!(!netlist.contains(".model"));
        assert!(netlist.ends_with(".tran 0.1ns 100ns\n.end\n"));
    }
}
