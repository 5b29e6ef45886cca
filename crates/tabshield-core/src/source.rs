use crate::genome::{identity, Gene, Genome};
use crate::table::CellTable;
use tabshield_protocol::ProtectionType;

/// Supplies the meaning of genes for one protection mode: how many there are,
/// which orders seed the search, and what the solver receives for each gene.
pub trait GenomeSource: Send + Sync {
    fn protection_type(&self) -> ProtectionType;

    fn gene_count(&self) -> usize;

    /// Deterministic starting orders. The first one is also the template for
    /// randomised individuals.
    fn seed_genomes(&self) -> Vec<Genome>;

    /// Underlying cell (or group) index submitted for a gene.
    fn cell_of(&self, gene: Gene) -> u64;

    fn submission_order(&self, genes: &[Gene]) -> Vec<u64> {
        genes.iter().map(|&g| self.cell_of(g)).collect()
    }
}

/// Individual protection: one gene per primary cell, ranked by descending
/// loss-of-information weight.
#[derive(Debug, Clone)]
pub struct PrimaryCellSource {
    cells: Vec<u64>,
}

impl PrimaryCellSource {
    pub fn from_table(table: &CellTable) -> Self {
        let mut primaries: Vec<(u64, f64)> =
            table.primary_cells().map(|c| (c.index, c.weight)).collect();
        // Stable: equal weights keep table order.
        primaries.sort_by(|a, b| b.1.total_cmp(&a.1));

        Self {
            cells: primaries.into_iter().map(|(idx, _)| idx).collect(),
        }
    }

    pub fn cells(&self) -> &[u64] {
        &self.cells
    }
}

impl GenomeSource for PrimaryCellSource {
    fn protection_type(&self) -> ProtectionType {
        ProtectionType::Individual
    }

    fn gene_count(&self) -> usize {
        self.cells.len()
    }

    fn seed_genomes(&self) -> Vec<Genome> {
        let descending = identity(self.cells.len());
        let ascending: Genome = descending.iter().rev().copied().collect();
        vec![descending, ascending]
    }

    fn cell_of(&self, gene: Gene) -> u64 {
        self.cells[gene as usize]
    }
}

/// Group protection: genes are group indices, submitted as-is.
#[derive(Debug, Clone, Copy)]
pub struct GroupSource {
    groups: usize,
}

impl GroupSource {
    pub fn new(groups: usize) -> Self {
        Self { groups }
    }
}

impl GenomeSource for GroupSource {
    fn protection_type(&self) -> ProtectionType {
        ProtectionType::Group
    }

    fn gene_count(&self) -> usize {
        self.groups
    }

    fn seed_genomes(&self) -> Vec<Genome> {
        let ascending = identity(self.groups);
        let descending: Genome = ascending.iter().rev().copied().collect();
        vec![ascending, descending]
    }

    fn cell_of(&self, gene: Gene) -> u64 {
        gene as u64
    }
}
