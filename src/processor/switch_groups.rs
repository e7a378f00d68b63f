use super::Processor;
use crate::api::response::switch_group::SwitchGroupEntry;
use crate::api::response::{to_i64, SparseTable};

impl Processor {
    /// Mode and first linked device of every configured switch group (447).
    pub fn process_switch_group_details(&self, entries: &SparseTable<SwitchGroupEntry>) {
        for (slot, name) in self.switch_groups.configured() {
            let entry = match entries.get(slot) {
                Some(entry) => entry,
                None => continue,
            };

            if let Some(mode) = entry.mode.value() {
                self.publish(&format!("SwitchGroup/{}/mode", name), mode);
            }

            let linked = match entry.linked.value().and_then(|l| l.first()) {
                Some(linked) => linked,
                None => continue,
            };
            let device = linked
                .device
                .value()
                .and_then(to_i64)
                .and_then(|i| usize::try_from(i).ok());
            match device.and_then(|i| self.topology.name(i)) {
                Some(device_name) => {
                    self.publish(&format!("SwitchGroup/{}/linkeddev", name), device_name)
                }
                None => log::debug!("Switch group {} links unknown device {:?}", name, device),
            }
            if let Some(sub_unit) = linked.sub_unit.value() {
                self.publish(&format!("SwitchGroup/{}/linkeddevsub", name), sub_unit);
            }
        }
    }
}
