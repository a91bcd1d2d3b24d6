use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;

use addrmap::{MapEntry, MapKind, MapTable};
use anyhow::{Context as _, Result, bail};
use ip_network::{Ipv4Network, Ipv6Network};
use serde::Deserialize;
use xlat::UdpCksumMode;

/// The configuration file, verbatim. Addresses and prefixes are kept as
/// strings here so parse failures can name the offending entry.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    /// TUN interface name.
    pub device: String,
    /// The translator's own IPv4 address.
    pub ipv4_addr: Ipv4Addr,
    /// The translator's own IPv6 address.
    pub ipv6_addr: Ipv6Addr,
    /// Overrides the MTU queried from the device.
    pub mtu: Option<u16>,
    /// Assumed MTU of off-link IPv6 destinations.
    pub ipv6_offlink_mtu: Option<u16>,
    #[serde(default)]
    pub wkpf_strict: bool,
    #[serde(default)]
    pub allow_ident_gen: bool,
    #[serde(default = "default_true")]
    pub lazy_frag_hdr: bool,
    #[serde(default)]
    pub udp_cksum_mode: UdpCksumModeConfig,

    #[serde(default, rename = "prefix")]
    pub prefixes: Vec<PrefixConfig>,
    #[serde(default, rename = "map")]
    pub maps: Vec<MapConfig>,
    #[serde(default, rename = "dynamic-pool")]
    pub dynamic_pools: Vec<DynamicPoolConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrefixConfig {
    /// An RFC 6052 translation prefix, e.g. `64:ff9b::/96`.
    pub prefix: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapConfig {
    /// The IPv4 side of an explicit mapping, e.g. `198.51.100.8/32`.
    pub ipv4: String,
    /// The IPv6 side, e.g. `2001:db8::8/128`.
    pub ipv6: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DynamicPoolConfig {
    /// IPv4 pool backing the prefix.
    pub pool: String,
    /// IPv6 prefix whose hosts draw from the pool.
    pub prefix: String,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UdpCksumModeConfig {
    #[default]
    Drop,
    Calc,
    Fwd,
}

impl From<UdpCksumModeConfig> for UdpCksumMode {
    fn from(mode: UdpCksumModeConfig) -> Self {
        match mode {
            UdpCksumModeConfig::Drop => UdpCksumMode::Drop,
            UdpCksumModeConfig::Calc => UdpCksumMode::Calc,
            UdpCksumModeConfig::Fwd => UdpCksumMode::Fwd,
        }
    }
}

fn default_true() -> bool {
    true
}

pub fn load(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config: FileConfig = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    if !addrmap::validate_ip4(config.ipv4_addr) {
        bail!("ipv4-addr {} is not a usable address", config.ipv4_addr);
    }
    if !addrmap::validate_ip6(config.ipv6_addr) {
        bail!("ipv6-addr {} is not a usable address", config.ipv6_addr);
    }

    if config.prefixes.is_empty() && config.maps.is_empty() {
        bail!("configuration defines no prefix and no map; nothing to translate");
    }

    Ok(config)
}

impl FileConfig {
    /// Builds the mapping table. Any invalid or conflicting entry is
    /// fatal.
    pub fn build_table(&self) -> Result<MapTable> {
        let mut table = MapTable::new(self.wkpf_strict);
        let mut line = 0u32;

        for entry in &self.prefixes {
            line += 1;

            let prefix: Ipv6Network = entry
                .prefix
                .parse()
                .with_context(|| format!("Invalid prefix `{}`", entry.prefix))?;

            table
                .insert(MapEntry::rfc6052(prefix, line))
                .with_context(|| format!("Cannot use prefix `{}`", entry.prefix))?;
        }

        for entry in &self.maps {
            line += 1;

            let v4: Ipv4Network = entry
                .ipv4
                .parse()
                .with_context(|| format!("Invalid map entry `{}`", entry.ipv4))?;
            let v6: Ipv6Network = entry
                .ipv6
                .parse()
                .with_context(|| format!("Invalid map entry `{}`", entry.ipv6))?;

            table
                .insert(MapEntry::static_map(v4, v6, line))
                .with_context(|| {
                    format!("Cannot map `{}` to `{}`", entry.ipv4, entry.ipv6)
                })?;
        }

        for entry in &self.dynamic_pools {
            line += 1;

            let pool: Ipv4Network = entry
                .pool
                .parse()
                .with_context(|| format!("Invalid pool `{}`", entry.pool))?;
            let prefix: Ipv6Network = entry
                .prefix
                .parse()
                .with_context(|| format!("Invalid pool prefix `{}`", entry.prefix))?;

            table
                .insert(MapEntry::dynamic(pool, prefix, line))
                .with_context(|| format!("Cannot use pool `{}`", entry.pool))?;
        }

        // The translator's own addresses must stay outside the mappings,
        // or it would try to translate traffic addressed to itself. The
        // v4 side is allowed under an RFC 6052 default route, which
        // unavoidably covers all of v4.
        if let Some(entry) = table.lookup4(self.ipv4_addr)
            && entry.kind != MapKind::Rfc6052
        {
            bail!(
                "ipv4-addr {} is covered by the mapping on line {}",
                self.ipv4_addr,
                entry.line
            );
        }

        if let Some(entry) = table.lookup6(self.ipv6_addr) {
            bail!(
                "ipv6-addr {} is covered by the mapping on line {}",
                self.ipv6_addr,
                entry.line
            );
        }

        Ok(table)
    }

    /// The data-path configuration, once the device MTU is known.
    pub fn xlat_config(&self, mtu: u16) -> xlat::Config {
        xlat::Config {
            local_addr4: self.ipv4_addr,
            local_addr6: self.ipv6_addr,
            mtu,
            ipv6_offlink_mtu: self.ipv6_offlink_mtu.unwrap_or(mtu).min(mtu),
            wkpf_strict: self.wkpf_strict,
            allow_ident_gen: self.allow_ident_gen,
            lazy_frag_hdr: self.lazy_frag_hdr,
            udp_cksum_mode: self.udp_cksum_mode.into(),
        }
    }
}
