//! Static resource profiles seeded into a fresh catalog.

use crate::types::{ProfileId, ResourceProfile};

/// (name, memory_mb, vcpus, root_gb, flavorid)
const SEED: &[(&str, u64, u32, u64, u32)] = &[
    ("m1.tiny", 512, 1, 0, 1),
    ("m1.small", 2048, 1, 20, 2),
    ("m1.medium", 4096, 2, 40, 3),
    ("m1.large", 8192, 4, 80, 4),
    ("m1.xlarge", 16384, 8, 160, 5),
    ("cg1.small", 2048, 1, 20, 101),
    ("cg1.medium", 4096, 2, 40, 102),
    ("cg1.large", 8192, 4, 80, 103),
    ("cg1.xlarge", 16384, 8, 160, 104),
    ("cg1.2xlarge", 16384, 8, 320, 105),
    ("cg1.4xlarge", 22000, 8, 640, 106),
    ("sh1.small", 2048, 1, 20, 201),
    ("sh1.medium", 4096, 2, 40, 202),
    ("sh1.large", 8192, 4, 80, 203),
    ("sh1.xlarge", 16384, 8, 160, 204),
    ("sh1.2xlarge", 32768, 16, 320, 205),
    ("sh1.4xlarge", 65536, 32, 320, 206),
    ("sh1.8xlarge", 131072, 64, 500, 207),
    ("sh1.16xlarge", 262144, 128, 500, 208),
    ("sh1.32xlarge", 524288, 256, 1000, 209),
    ("tp64.8x8", 16384, 1, 1000, 302),
];

/// The legacy static catalog, with ids assigned in seed order starting at 1.
pub fn default_profiles() -> Vec<ResourceProfile> {
    SEED.iter()
        .enumerate()
        .map(|(idx, &(name, memory_mb, vcpus, root_gb, flavorid))| {
            let id = idx as ProfileId + 1;
            let profile = ResourceProfile::new(id, flavorid, name, vcpus, memory_mb, root_gb);
            with_seed_specs(profile)
        })
        .collect()
}

fn with_seed_specs(profile: ResourceProfile) -> ResourceProfile {
    let family = profile.name.split('.').next().unwrap_or_default().to_string();
    match family.as_str() {
        "cg1" => {
            let gpus = match profile.name.as_str() {
                "cg1.small" => 1,
                "cg1.medium" => 2,
                "cg1.large" => 3,
                _ => 4,
            };
            profile
                .with_extra_spec("cpu_arch", "s== x86_64")
                .with_extra_spec("gpu_arch", "s== fermi")
                .with_extra_spec("gpus", format!("= {gpus}"))
        }
        "sh1" => profile
            .with_extra_spec("cpu_arch", "s== x86_64")
            .with_extra_spec("system_type", "s== UV"),
        "tp64" => profile
            .with_extra_spec("cpu_arch", "s== tilepro64")
            .with_extra_spec("vcores", "= 64")
            .with_extra_spec("hypervisor_type", "s== tilera_hv")
            .with_extra_spec("baremetal_driver", "s== tilera"),
        _ => profile,
    }
}
