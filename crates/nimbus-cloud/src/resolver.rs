use crate::error::{ReconcileError, ResourceKind};
use crate::model::{FlavorQuery, ImageQuery, NamedResource, NetworkAttachment, ResolvedAttachment};
use crate::provider::ComputeClient;

/// Resolves human-friendly references against the live catalog.
///
/// Read-only; nothing is cached between calls. Failures mean the spec points at something that
/// does not exist (or is ambiguous) and are never worth retrying.
pub struct ResourceResolver<'a> {
    client: &'a dyn ComputeClient,
}

impl<'a> ResourceResolver<'a> {
    pub fn new(client: &'a dyn ComputeClient) -> Self {
        Self { client }
    }

    /// Resolve an image reference to an image ID
    ///
    /// Candidates whose name contains the exclusion text are dropped. If several remain, only
    /// those whose ID or full name equals the reference are kept. Exactly one must be left.
    pub async fn resolve_image(&self, query: &ImageQuery) -> Result<String, ReconcileError> {
        let candidates = self.client.find_images(&query.reference).await?;
        let total = candidates.len();

        let mut remaining: Vec<_> = candidates
            .into_iter()
            .filter(|image| match &query.exclude {
                Some(exclude) => !image.name.contains(exclude.as_str()),
                None => true,
            })
            .collect();

        if remaining.len() > 1 {
            let exact: Vec<_> = remaining
                .iter()
                .filter(|image| image.id == query.reference || image.name == query.reference)
                .cloned()
                .collect();
            if !exact.is_empty() {
                remaining = exact;
            }
        }

        tracing::debug!(
            "Image '{}': {} candidate(s), {} after exclusion filter",
            query.reference,
            total,
            remaining.len()
        );

        match remaining.as_slice() {
            [image] => Ok(image.id.clone()),
            [] => Err(ReconcileError::not_found(
                ResourceKind::Image,
                &query.reference,
                if total == 0 {
                    "no image with this name or ID".to_string()
                } else {
                    format!("all {} match(es) excluded by filter", total)
                },
            )),
            many => Err(ReconcileError::not_found(
                ResourceKind::Image,
                &query.reference,
                format!(
                    "ambiguous, {} images match: {}",
                    many.len(),
                    many.iter()
                        .map(|i| i.id.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )),
        }
    }

    /// Resolve a flavor query to a flavor ID
    ///
    /// For a capacity query the flavor with the smallest RAM at or above the floor wins, among
    /// those whose name contains the include text. Ties on RAM go to the first flavor in catalog
    /// order.
    pub async fn resolve_flavor(&self, query: &FlavorQuery) -> Result<String, ReconcileError> {
        match query {
            FlavorQuery::Exact(reference) => self
                .client
                .get_flavor(reference)
                .await?
                .map(|flavor| flavor.id)
                .ok_or_else(|| {
                    ReconcileError::not_found(
                        ResourceKind::Flavor,
                        reference,
                        "no flavor with this name or ID",
                    )
                }),
            FlavorQuery::Capacity {
                min_ram_mb,
                include,
            } => {
                let flavors = self.client.list_flavors().await?;
                let chosen = flavors
                    .iter()
                    .filter(|f| f.ram_mb >= *min_ram_mb)
                    .filter(|f| match include {
                        Some(text) => f.name.contains(text.as_str()),
                        None => true,
                    })
                    .min_by_key(|f| f.ram_mb);

                match chosen {
                    Some(flavor) => {
                        tracing::debug!(
                            "Selected flavor '{}' ({} MB) for >= {} MB",
                            flavor.name,
                            flavor.ram_mb,
                            min_ram_mb
                        );
                        Ok(flavor.id.clone())
                    }
                    None => Err(ReconcileError::not_found(
                        ResourceKind::Flavor,
                        format!(">= {} MB", min_ram_mb),
                        match include {
                            Some(text) => {
                                format!("no flavor containing '{}' is large enough", text)
                            }
                            None => "no flavor is large enough".to_string(),
                        },
                    )),
                }
            }
        }
    }

    /// Resolve one network attachment; IDs pass through untouched
    pub async fn resolve_network_attachment(
        &self,
        attachment: &NetworkAttachment,
    ) -> Result<ResolvedAttachment, ReconcileError> {
        match attachment {
            NetworkAttachment::NetId(id) => Ok(ResolvedAttachment::NetId(id.clone())),
            NetworkAttachment::PortId(id) => Ok(ResolvedAttachment::PortId(id.clone())),
            NetworkAttachment::NetName(name) => {
                let found = self.client.find_networks(name).await?;
                exactly_one(ResourceKind::Network, name, found).map(ResolvedAttachment::NetId)
            }
            NetworkAttachment::PortName(name) => {
                let found = self.client.find_ports(name).await?;
                exactly_one(ResourceKind::Port, name, found).map(ResolvedAttachment::PortId)
            }
        }
    }

    /// Resolve all attachments, keeping their order
    pub async fn resolve_network_attachments(
        &self,
        attachments: &[NetworkAttachment],
    ) -> Result<Vec<ResolvedAttachment>, ReconcileError> {
        let mut resolved = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            resolved.push(self.resolve_network_attachment(attachment).await?);
        }
        Ok(resolved)
    }
}

fn exactly_one(
    kind: ResourceKind,
    name: &str,
    found: Vec<NamedResource>,
) -> Result<String, ReconcileError> {
    match found.as_slice() {
        [one] => Ok(one.id.clone()),
        [] => Err(ReconcileError::not_found(
            kind,
            name,
            format!("no {} with this name", kind),
        )),
        many => Err(ReconcileError::not_found(
            kind,
            name,
            format!("ambiguous, {} {}s share this name", many.len(), kind),
        )),
    }
}
